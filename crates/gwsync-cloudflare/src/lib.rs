// # Cloudflare Gateway Transport
//
// This crate implements `GatewayApi` against the Cloudflare Zero Trust
// Gateway API (lists and DNS rules of one account).
//
// ## Scope
//
// - One HTTP request per trait call
// - Status codes are mapped to `gwsync_core::Error` variants; HTTP 429
//   becomes `Error::RateLimited` so the client's retry policy can tell
//   throttling apart from other failures
// - No retry, backoff or rate limiting here: `GatewayClient` owns them
// - No caching: `ListCache` owns remote state between calls
//
// ## Dry-Run Mode
//
// Reads are sent as usual. Mutations log the request they would send and
// return a synthesized result, so a full reconciliation can be previewed
// against the live account without changing it.
//
// ## Security
//
// - The API token never appears in logs or `Debug` output
// - Construction fails if the token or account identifier is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Lists: `/accounts/:account_id/gateway/lists[/:list_id[/items]]`
// - Rules: `/accounts/:account_id/gateway/rules[/:rule_id]`

use async_trait::async_trait;
use gwsync_core::config::{GatewayConfig, MAX_LIST_SIZE};
use gwsync_core::traits::{GatewayApi, GatewayList, GatewayRule};
use gwsync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Description attached to lists and rules this tool creates
const CREATED_BY: &str = "Created by gwsync.";

const SERVICE: &str = "cloudflare";

/// Response envelope shared by every Cloudflare v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    value: String,
}

/// Cloudflare Zero Trust Gateway transport
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the transport will:
/// - Perform all GET requests (lists, items, rules)
/// - Log the intended POST/PATCH/PUT/DELETE request
/// - **NOT** modify any list or rule
pub struct CloudflareGateway {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account owning the lists and rules
    account_id: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,

    /// Source of identifiers for objects "created" in dry-run mode
    dry_run_ids: AtomicU64,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareGateway")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareGateway {
    /// Create a new Cloudflare Gateway transport
    ///
    /// # Parameters
    ///
    /// - `api_token`: API token with Zero Trust edit permissions
    /// - `account_id`: Account identifier
    /// - `dry_run`: If true, perform GET requests but skip mutations
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the token or account is empty, or if the
    /// HTTP client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let account_id = account_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if account_id.is_empty() {
            return Err(Error::config("Cloudflare account identifier cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id,
            client,
            dry_run,
            dry_run_ids: AtomicU64::new(0),
        })
    }

    /// Create a transport in live mode
    pub fn new_live(api_token: impl Into<String>, account_id: impl Into<String>) -> Result<Self> {
        Self::new(api_token, account_id, false)
    }

    /// Create a transport in dry-run mode
    pub fn new_dry_run(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(api_token, account_id, true)
    }

    /// Create a transport from configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        if config.dry_run {
            tracing::warn!("Cloudflare transport running in DRY-RUN mode - no changes will be made");
        }
        Self::new(config.api_token.clone(), config.account_id.clone(), config.dry_run)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/accounts/{}/gateway/{}",
            CLOUDFLARE_API_BASE, self.account_id, path
        )
    }

    /// Send a request and unwrap the `result` field of the envelope
    async fn send<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), path, &error_text));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::api(SERVICE, format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            return Err(Error::api(SERVICE, describe_errors(&envelope.errors)));
        }
        Ok(envelope.result)
    }

    async fn send_expecting<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        self.send(method, path, body).await?.ok_or_else(|| {
            Error::api(SERVICE, format!("Invalid response format: {} has no result", path))
        })
    }

    /// Log a mutation instead of sending it
    fn log_dry_run(&self, method: &str, path: &str, body: Option<&Value>) {
        match body {
            Some(body) => tracing::info!(
                "[DRY-RUN] Would send {} request to {} with payload: {}",
                method,
                self.url(path),
                summarize_payload(body)
            ),
            None => tracing::info!("[DRY-RUN] Would send {} request to {}", method, self.url(path)),
        }
    }

    /// UUID-shaped identifier for an object that was never created
    fn dry_run_id(&self) -> String {
        let n = self.dry_run_ids.fetch_add(1, Ordering::Relaxed) + 1;
        format!("00000000-0000-4000-8000-{:012x}", n)
    }
}

/// Map a non-success HTTP status to an error of the right retry class
fn status_error(status: u16, path: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::api(
            SERVICE,
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("Gateway resource not found: {}", path)),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded on {}. Status: {}",
            path, status
        )),
        500..=599 => Error::api(
            SERVICE,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::api(
            SERVICE,
            format!("Request to {} failed: {} - {}", path, status, body),
        ),
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "Request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Large item arrays are reduced to their length in dry-run logs
fn summarize_payload(body: &Value) -> Value {
    let mut summary = body.clone();
    if let Some(object) = summary.as_object_mut() {
        for key in ["items", "append", "remove"] {
            if let Some(Value::Array(values)) = object.get(key) {
                let count = values.len();
                object.insert(key.to_string(), json!(format!("<{} items>", count)));
            }
        }
    }
    summary
}

fn create_list_payload(name: &str, domains: &[String]) -> Value {
    json!({
        "name": name,
        "description": CREATED_BY,
        "type": "DOMAIN",
        "items": domains.iter().map(|d| json!({ "value": d })).collect::<Vec<_>>(),
    })
}

fn update_list_payload(remove: &[String], append: &[String]) -> Value {
    json!({
        "remove": remove,
        "append": append.iter().map(|d| json!({ "value": d })).collect::<Vec<_>>(),
    })
}

fn create_rule_payload(name: &str, traffic: &str) -> Value {
    json!({
        "name": name,
        "description": CREATED_BY,
        "action": "block",
        "enabled": true,
        "filters": ["dns"],
        "traffic": traffic,
        "rule_settings": {
            "block_page_enabled": false,
        },
    })
}

fn update_rule_payload(name: &str, traffic: &str) -> Value {
    json!({
        "name": name,
        "action": "block",
        "enabled": true,
        "traffic": traffic,
    })
}

#[async_trait]
impl GatewayApi for CloudflareGateway {
    /// ```http
    /// GET /accounts/:account_id/gateway/lists
    /// ```
    async fn list_lists(&self) -> Result<Vec<GatewayList>> {
        let lists: Option<Vec<GatewayList>> = self.send(reqwest::Method::GET, "lists", None).await?;
        Ok(lists.unwrap_or_default())
    }

    /// Only the first page is requested
    ///
    /// ```http
    /// GET /accounts/:account_id/gateway/lists/:list_id/items?limit=1000
    /// ```
    async fn list_items(&self, list_id: &str) -> Result<Vec<String>> {
        let path = format!("lists/{}/items?limit={}", list_id, MAX_LIST_SIZE);
        let items: Option<Vec<ListItem>> = self.send(reqwest::Method::GET, &path, None).await?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.value)
            .collect())
    }

    /// ```http
    /// POST /accounts/:account_id/gateway/lists
    /// { "name": "...", "description": "...", "type": "DOMAIN", "items": [{ "value": "..." }] }
    /// ```
    async fn create_list(&self, name: &str, domains: &[String]) -> Result<GatewayList> {
        let payload = create_list_payload(name, domains);

        if self.dry_run {
            self.log_dry_run("POST", "lists", Some(&payload));
            let mut list = GatewayList::new(self.dry_run_id(), name);
            list.description = Some(CREATED_BY.to_string());
            list.count = Some(domains.len() as u64);
            return Ok(list);
        }

        let list: GatewayList = self
            .send_expecting(reqwest::Method::POST, "lists", Some(&payload))
            .await?;
        tracing::info!("Created list {} ({} items)", list.name, domains.len());
        Ok(list)
    }

    /// ```http
    /// PATCH /accounts/:account_id/gateway/lists/:list_id
    /// { "remove": ["..."], "append": [{ "value": "..." }] }
    /// ```
    async fn update_list(
        &self,
        list_id: &str,
        remove: &[String],
        append: &[String],
    ) -> Result<GatewayList> {
        let path = format!("lists/{}", list_id);
        let payload = update_list_payload(remove, append);

        if self.dry_run {
            self.log_dry_run("PATCH", &path, Some(&payload));
            return Ok(GatewayList::new(list_id, ""));
        }

        let list: GatewayList = self
            .send_expecting(reqwest::Method::PATCH, &path, Some(&payload))
            .await?;
        tracing::info!(
            "Updated list {} (-{} +{})",
            list.name,
            remove.len(),
            append.len()
        );
        Ok(list)
    }

    /// ```http
    /// DELETE /accounts/:account_id/gateway/lists/:list_id
    /// ```
    async fn delete_list(&self, list_id: &str) -> Result<()> {
        let path = format!("lists/{}", list_id);

        if self.dry_run {
            self.log_dry_run("DELETE", &path, None);
            return Ok(());
        }

        self.send::<Value>(reqwest::Method::DELETE, &path, None)
            .await?;
        tracing::info!("Deleted list {}", list_id);
        Ok(())
    }

    /// ```http
    /// GET /accounts/:account_id/gateway/rules
    /// ```
    async fn list_rules(&self) -> Result<Vec<GatewayRule>> {
        let rules: Option<Vec<GatewayRule>> = self.send(reqwest::Method::GET, "rules", None).await?;
        Ok(rules.unwrap_or_default())
    }

    /// ```http
    /// POST /accounts/:account_id/gateway/rules
    /// ```
    async fn create_rule(&self, name: &str, traffic: &str) -> Result<GatewayRule> {
        let payload = create_rule_payload(name, traffic);

        if self.dry_run {
            self.log_dry_run("POST", "rules", Some(&payload));
            return Ok(GatewayRule::new(self.dry_run_id(), name, traffic));
        }

        let rule: GatewayRule = self
            .send_expecting(reqwest::Method::POST, "rules", Some(&payload))
            .await?;
        tracing::info!("Created rule {}", rule.name);
        Ok(rule)
    }

    /// ```http
    /// PUT /accounts/:account_id/gateway/rules/:rule_id
    /// ```
    async fn update_rule(&self, rule_id: &str, name: &str, traffic: &str) -> Result<GatewayRule> {
        let path = format!("rules/{}", rule_id);
        let payload = update_rule_payload(name, traffic);

        if self.dry_run {
            self.log_dry_run("PUT", &path, Some(&payload));
            return Ok(GatewayRule::new(rule_id, name, traffic));
        }

        let rule: GatewayRule = self
            .send_expecting(reqwest::Method::PUT, &path, Some(&payload))
            .await?;
        tracing::info!("Updated rule {}", rule.name);
        Ok(rule)
    }

    /// ```http
    /// DELETE /accounts/:account_id/gateway/rules/:rule_id
    /// ```
    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let path = format!("rules/{}", rule_id);

        if self.dry_run {
            self.log_dry_run("DELETE", &path, None);
            return Ok(());
        }

        self.send::<Value>(reqwest::Method::DELETE, &path, None)
            .await?;
        tracing::info!("Deleted rule {}", rule_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}
