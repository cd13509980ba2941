// # GitHub Actions Pipeline Status
//
// This crate implements `PipelineStatus` for a repository's GitHub Actions
// workflow runs and caches.
//
// ## Scope
//
// - One HTTP request per trait call
// - Non-success statuses are mapped to `gwsync_core::Error`; the cache
//   store decides what a failure means (discard for status lookups,
//   log-and-continue for housekeeping)
//
// ## Security
//
// - The token never appears in logs or `Debug` output
//
// ## API Reference
//
// - List runs: GET `/repos/:owner/:repo/actions/runs?per_page=N`
// - Delete run: DELETE `/repos/:owner/:repo/actions/runs/:run_id`
// - List caches: GET `/repos/:owner/:repo/actions/caches`
// - Delete cache: DELETE `/repos/:owner/:repo/actions/caches/:cache_id`

use async_trait::async_trait;
use gwsync_core::config::PipelineConfig;
use gwsync_core::traits::{PipelineCacheEntry, PipelineRun, PipelineStatus};
use gwsync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// GitHub REST API base URL
const GITHUB_API_BASE: &str = "https://api.github.com";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const SERVICE: &str = "github";

#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<PipelineRun>,
}

#[derive(Debug, Deserialize)]
struct CachesPage {
    #[serde(default)]
    actions_caches: Vec<PipelineCacheEntry>,
}

/// GitHub Actions status source for one repository
pub struct GitHubPipeline {
    /// Repository in `owner/name` form
    repository: String,

    /// Token with `actions: write` on the repository
    /// ⚠️ NEVER log this value
    token: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for GitHubPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubPipeline")
            .field("repository", &self.repository)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl GitHubPipeline {
    /// Create a status source for `repository`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the repository is not `owner/name`, the
    /// token is empty, or the HTTP client cannot be built.
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let repository = repository.into();
        let token = token.into();

        if !is_repository_slug(&repository) {
            return Err(Error::config(format!(
                "Repository must be in owner/name form, got {:?}",
                repository
            )));
        }
        if token.is_empty() {
            return Err(Error::config("GitHub token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(concat!("gwsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            repository,
            token,
            client,
        })
    }

    /// Create a status source from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.repository.clone(), config.token.clone())
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/actions/{}", GITHUB_API_BASE, self.repository, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), path, &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::api(SERVICE, format!("Failed to parse {} response: {}", path, e)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, path)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), path, &body));
        }
        Ok(())
    }
}

fn is_repository_slug(repository: &str) -> bool {
    match repository.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}

fn status_error(status: u16, path: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::api(
            SERVICE,
            format!("Authentication failed: token lacks access. Status: {}", status),
        ),
        404 => Error::not_found(format!("GitHub resource not found: {}", path)),
        429 => Error::rate_limited(format!("Rate limit exceeded on {}", path)),
        _ => Error::api(
            SERVICE,
            format!("Request to {} failed: {} - {}", path, status, body),
        ),
    }
}

#[async_trait]
impl PipelineStatus for GitHubPipeline {
    async fn recent_runs(&self, limit: u32) -> Result<Vec<PipelineRun>> {
        let page: RunsPage = self.get(&format!("runs?per_page={}", limit)).await?;
        tracing::debug!(
            "Fetched {} recent runs of {}",
            page.workflow_runs.len(),
            self.repository
        );
        Ok(page.workflow_runs)
    }

    async fn delete_run(&self, run_id: u64) -> Result<()> {
        self.delete(&format!("runs/{}", run_id)).await
    }

    async fn list_caches(&self) -> Result<Vec<PipelineCacheEntry>> {
        let page: CachesPage = self.get("caches").await?;
        Ok(page.actions_caches)
    }

    async fn delete_cache(&self, cache_id: u64) -> Result<()> {
        self.delete(&format!("caches/{}", cache_id)).await
    }
}
