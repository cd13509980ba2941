// # gwsync - Gateway blocklist sync
//
// One-shot command that converges Cloudflare Zero Trust Gateway lists and a
// block rule on the union of local blocklist files.
//
// This binary is a thin integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Cloudflare transport, the pipeline status source and the cache
// 4. Running the reconciler once and reporting the result
//
// All reconciliation logic lives in gwsync-core.
//
// ## Configuration
//
// ### Cloudflare
// - `CF_API_TOKEN`: API token with Zero Trust edit permissions (required)
// - `CF_IDENTIFIER`: Account identifier (required)
//
// ### Pipeline
// - `GITHUB_ACTIONS`: `true` when running inside GitHub Actions
// - `GITHUB_REPOSITORY`: `owner/name` (required inside the pipeline)
// - `GITHUB_TOKEN`: Token allowed to manage workflow runs and caches
//   (required inside the pipeline)
//
// ### Sync
// - `GWSYNC_BLOCKLISTS`: Comma-separated blocklist file paths (required)
// - `GWSYNC_PREFIX`: Name prefix of the managed lists and rule (default `Block ads`)
// - `GWSYNC_CACHE_PATH`: Snapshot file (default `cache.json`)
// - `GWSYNC_MAX_LIST_SIZE`: Domains per list, 1 to 1000 (default 1000)
// - `GWSYNC_DRY_RUN`: `true` to log mutations instead of sending them
// - `GWSYNC_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// export CF_API_TOKEN=your_token
// export CF_IDENTIFIER=your_account_id
// export GWSYNC_BLOCKLISTS=lists/ads.txt,lists/trackers.txt
//
// gwsync
// ```

use anyhow::Result;
use gwsync_cloudflare::CloudflareGateway;
use gwsync_core::blocklist::load_blocklists;
use gwsync_core::config::{CacheConfig, MAX_LIST_SIZE};
use gwsync_core::{
    CacheStore, GatewayClient, GatewayConfig, ListCache, PipelineConfig, PipelineStatus,
    ReconcileReport, Reconciler, SyncConfig,
};
use gwsync_github::GitHubPipeline;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PREFIX: &str = "Block ads";

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    /// Every mutation succeeded (or none was needed)
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Reconciliation failed
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    gateway: GatewayConfig,
    pipeline: Option<PipelineConfig>,
    prefix: String,
    blocklists: Vec<PathBuf>,
    cache_path: PathBuf,
    max_list_size: usize,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} is required. Set it via: export {}=...", key, key))
        };

        let mut gateway = GatewayConfig::new(required("CF_API_TOKEN")?, required("CF_IDENTIFIER")?);
        gateway.dry_run = lookup("GWSYNC_DRY_RUN").is_some_and(|v| is_truthy(&v));

        let pipeline = if lookup("GITHUB_ACTIONS").is_some_and(|v| is_truthy(&v)) {
            Some(PipelineConfig::new(
                required("GITHUB_REPOSITORY")?,
                required("GITHUB_TOKEN")?,
            ))
        } else {
            None
        };

        let max_list_size = match lookup("GWSYNC_MAX_LIST_SIZE") {
            Some(value) => value.trim().parse().map_err(|_| {
                anyhow::anyhow!("GWSYNC_MAX_LIST_SIZE must be a number. Got: {}", value)
            })?,
            None => MAX_LIST_SIZE,
        };

        Ok(Self {
            gateway,
            pipeline,
            prefix: lookup("GWSYNC_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            blocklists: required("GWSYNC_BLOCKLISTS")?
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
            cache_path: lookup("GWSYNC_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| CacheConfig::default().path),
            max_list_size,
            log_level: lookup("GWSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Library configuration equivalent to these settings
    fn sync_config(&self) -> SyncConfig {
        let mut sync = SyncConfig::new(self.gateway.clone(), self.prefix.clone());
        sync.pipeline = self.pipeline.clone();
        sync.cache.path = self.cache_path.clone();
        sync.reconcile.max_list_size = self.max_list_size;
        sync
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.gateway.api_token.to_lowercase();
        if token_lower.contains("your_token") || token_lower.contains("replace_me") {
            anyhow::bail!(
                "CF_API_TOKEN appears to be a placeholder. \
                Use an actual API token from the Cloudflare dashboard."
            );
        }

        if self.blocklists.is_empty() {
            anyhow::bail!(
                "GWSYNC_BLOCKLISTS must name at least one file. \
                Set it via: export GWSYNC_BLOCKLISTS=lists/ads.txt,lists/trackers.txt"
            );
        }

        if let Some(parent) = self.cache_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "GWSYNC_CACHE_PATH parent directory does not exist: {}",
                parent.display()
            );
        }

        parse_log_level(&self.log_level)?;
        self.sync_config().validate()?;
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "GWSYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Snapshot file written by dry runs, next to the real one
fn dry_run_cache_path(path: &Path) -> PathBuf {
    path.with_extension("dry-run.json")
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting gwsync");
    info!(
        "Configuration loaded: prefix '{}', {} blocklist(s), pipeline: {}, dry-run: {}",
        config.prefix,
        config.blocklists.len(),
        config.pipeline.is_some(),
        config.gateway.dry_run
    );

    // The run is strictly sequential
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(run_sync(&config));

    match result {
        Ok(report) => {
            info!(
                "Sync finished: {} domains, lists {} created / {} updated / {} unchanged / {} deleted, \
                rules {} created / {} updated / {} unchanged / {} deleted",
                report.domains,
                report.lists_created,
                report.lists_updated,
                report.lists_unchanged,
                report.lists_deleted,
                report.rules_created,
                report.rules_updated,
                report.rules_unchanged,
                report.rules_deleted
            );
            SyncExitCode::Success.into()
        }
        Err(e) => {
            error!("Sync failed: {:#}", e);
            exit_code_for(&e).into()
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> SyncExitCode {
    match err.downcast_ref::<gwsync_core::Error>() {
        Some(gwsync_core::Error::Config(_)) => SyncExitCode::ConfigError,
        _ => SyncExitCode::RuntimeError,
    }
}

/// Run one reconciliation
async fn run_sync(config: &Config) -> Result<ReconcileReport> {
    let sync = config.sync_config();

    let domains = load_blocklists(&config.blocklists).await?;
    info!("{} unique domains to block", domains.len());

    let api = CloudflareGateway::from_config(&sync.gateway)?;
    let client = GatewayClient::from_config(Box::new(api), &sync);
    let cache = open_cache(&sync).await?;

    let mut reconciler = Reconciler::new(client, cache, &sync.reconcile)?;
    let report = reconciler.run(&domains).await?;
    Ok(report)
}

/// Load the snapshot this run starts from
///
/// Dry runs read the real snapshot without judging it, so nothing is
/// deleted, and record their synthesized results in a separate file.
async fn open_cache(sync: &SyncConfig) -> Result<ListCache> {
    let store = CacheStore::new(&sync.cache.path);

    if sync.gateway.dry_run {
        let snapshot = store.load(None, 0).await;
        let preview = dry_run_cache_path(&sync.cache.path);
        info!("Dry run: recording results in {}", preview.display());
        return Ok(ListCache::new(CacheStore::new(preview), snapshot));
    }

    let pipeline = sync
        .pipeline
        .as_ref()
        .map(GitHubPipeline::from_config)
        .transpose()?;
    let runs_to_inspect = sync.pipeline.as_ref().map_or(0, |p| p.runs_to_inspect);

    Ok(ListCache::open(
        store,
        pipeline.as_ref().map(|p| p as &dyn PipelineStatus),
        runs_to_inspect,
    )
    .await)
}
