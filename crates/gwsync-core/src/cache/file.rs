// # Cache Store
//
// File-backed persistence of the cache snapshot.
//
// ## Trust
//
// Inside the CI pipeline the snapshot is carried over from the previous run.
// It is trusted only when the most recent completed run (among the last few)
// concluded with "success". Any other outcome, or a failure to find out,
// discards the file and starts from an empty snapshot. Discarding also
// deletes the completed runs and the pipeline's cache entries, best-effort.
//
// Outside the pipeline the file on disk is always used when present.
//
// ## Crash Behavior
//
// - Writes go to a temporary file that is renamed over the snapshot, so a
//   reader never sees a partially written file
// - A malformed snapshot is logged and replaced by an empty one
//
// ## File Format
//
// ```json
// {
//   "lists": [{ "id": "...", "name": "Block ads - 001" }],
//   "rules": [{ "id": "...", "name": "Block ads", "traffic": "...", "enabled": true }],
//   "mapping": { "<list id>": ["ads.example.com"] }
// }
// ```

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::CacheSnapshot;
use crate::Error;
use crate::traits::{PipelineStatus, latest_completed};

/// File-backed snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use gwsync_core::cache::{CacheSnapshot, CacheStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = CacheStore::new("cache.json");
///
///     let snapshot = store.load(None, 5).await;
///     store.save(&snapshot).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Create a store for the snapshot at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, deciding first whether it can be trusted
    ///
    /// Never fails: every problem degrades to an empty snapshot.
    ///
    /// # Parameters
    ///
    /// - `pipeline`: Pipeline status source when running inside the pipeline
    /// - `runs_to_inspect`: How many recent runs to search for a completed one
    pub async fn load(
        &self,
        pipeline: Option<&dyn PipelineStatus>,
        runs_to_inspect: u32,
    ) -> CacheSnapshot {
        let Some(pipeline) = pipeline else {
            return self.read_snapshot().await;
        };

        let runs = match pipeline.recent_runs(runs_to_inspect).await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::warn!(
                    "Could not determine previous pipeline outcome: {}. Discarding cache.",
                    e
                );
                self.discard().await;
                return CacheSnapshot::new();
            }
        };

        match latest_completed(&runs) {
            Some(run) if run.is_success() => {
                tracing::info!("Previous pipeline run {} succeeded, trusting cache", run.id);
                self.read_snapshot().await
            }
            Some(run) => {
                tracing::info!(
                    "Previous pipeline run {} concluded {}, discarding cache",
                    run.id,
                    run.conclusion.as_deref().unwrap_or("without a conclusion")
                );
                self.discard().await;

                let completed: Vec<u64> = runs
                    .iter()
                    .filter(|run| run.is_completed())
                    .map(|run| run.id)
                    .collect();
                housekeeping(pipeline, &completed).await;

                CacheSnapshot::new()
            }
            None => {
                tracing::info!(
                    "No completed run among the last {}, discarding cache",
                    runs_to_inspect
                );
                self.discard().await;
                CacheSnapshot::new()
            }
        }
    }

    /// Read the snapshot file, treating absence and corruption as empty
    async fn read_snapshot(&self) -> CacheSnapshot {
        if !self.path.exists() {
            tracing::debug!("Cache file does not exist: {}", self.path.display());
            return CacheSnapshot::new();
        }

        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    "Failed to read cache file {}: {}. Starting with empty cache.",
                    self.path.display(),
                    e
                );
                return CacheSnapshot::new();
            }
        };

        match serde_json::from_str::<CacheSnapshot>(&content) {
            Ok(snapshot) => {
                tracing::debug!(
                    "Loaded cache: {} lists, {} rules, {} item sets",
                    snapshot.lists.len(),
                    snapshot.rules.len(),
                    snapshot.item_mapping.len()
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!(
                    "Cache file {} appears corrupted: {}. Starting with empty cache.",
                    self.path.display(),
                    e
                );
                CacheSnapshot::new()
            }
        }
    }

    /// Write the snapshot atomically (temp file, then rename)
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::cache(format!(
                        "Failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string(snapshot)
            .map_err(|e| Error::cache(format!("Failed to serialize cache: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::cache(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Cache written to file: {}", self.path.display());
        Ok(())
    }

    /// Remove the snapshot file, if any
    async fn discard(&self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!("Removed stale cache file {}", self.path.display()),
            Err(e) => tracing::warn!(
                "Failed to remove stale cache file {}: {}",
                self.path.display(),
                e
            ),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

/// Delete completed runs and cache entries; failures are logged only
async fn housekeeping(pipeline: &dyn PipelineStatus, completed_runs: &[u64]) {
    for &run_id in completed_runs {
        match pipeline.delete_run(run_id).await {
            Ok(()) => tracing::info!("Deleted completed pipeline run {}", run_id),
            Err(e) => tracing::warn!("Failed to delete pipeline run {}: {}", run_id, e),
        }
    }

    let caches = match pipeline.list_caches().await {
        Ok(caches) => caches,
        Err(e) => {
            tracing::warn!("Failed to list pipeline caches: {}", e);
            return;
        }
    };

    for cache in caches {
        match pipeline.delete_cache(cache.id).await {
            Ok(()) => tracing::info!("Deleted pipeline cache {} ({})", cache.id, cache.key),
            Err(e) => tracing::warn!("Failed to delete pipeline cache {}: {}", cache.id, e),
        }
    }
}
