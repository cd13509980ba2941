// # Pipeline Status Trait
//
// Defines the interface to the CI pipeline that runs gwsync.
//
// ## Purpose
//
// The cache file is carried between pipeline runs. It is only trustworthy
// when the previous completed run succeeded: a failed or cancelled run may
// have died between a remote mutation and the cache write that records it.
//
// ## Implementations
//
// - GitHub Actions: `gwsync-github` crate

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status value of a finished run
pub const STATUS_COMPLETED: &str = "completed";

/// Conclusion value of a successful run
pub const CONCLUSION_SUCCESS: &str = "success";

/// One pipeline run as reported by the pipeline API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier
    pub id: u64,
    /// Lifecycle status ("queued", "in_progress", "completed", ...)
    pub status: String,
    /// Terminal outcome, present once the run is completed
    #[serde(default)]
    pub conclusion: Option<String>,
    /// When the run was created
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    pub fn is_success(&self) -> bool {
        self.conclusion.as_deref() == Some(CONCLUSION_SUCCESS)
    }
}

/// One entry of the pipeline's artifact cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCacheEntry {
    /// Cache entry identifier
    pub id: u64,
    /// Cache key
    #[serde(default)]
    pub key: String,
}

/// Trait for pipeline status implementations
///
/// Only [`recent_runs`](PipelineStatus::recent_runs) influences the outcome
/// of a run. The deletion methods are housekeeping: callers log and swallow
/// their failures.
#[async_trait]
pub trait PipelineStatus: Send + Sync {
    /// Fetch the most recent runs, newest first
    async fn recent_runs(&self, limit: u32) -> Result<Vec<PipelineRun>, crate::Error>;

    /// Delete a run
    async fn delete_run(&self, run_id: u64) -> Result<(), crate::Error>;

    /// Fetch the pipeline's cache entries
    async fn list_caches(&self) -> Result<Vec<PipelineCacheEntry>, crate::Error>;

    /// Delete a cache entry
    async fn delete_cache(&self, cache_id: u64) -> Result<(), crate::Error>;
}

/// Pick the newest completed run out of a newest-first sequence
pub fn latest_completed(runs: &[PipelineRun]) -> Option<&PipelineRun> {
    runs.iter().find(|run| run.is_completed())
}
