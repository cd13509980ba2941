// # Gateway API Trait
//
// Defines the single-shot transport interface to the Gateway list/rule API.
//
// ## Implementations
//
// - Cloudflare Zero Trust Gateway: `gwsync-cloudflare` crate
// - Tests: in-memory fakes under `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use gwsync_core::GatewayApi;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let api = /* GatewayApi implementation */;
//
//     let list = api.create_list("Block ads - 001", &["ads.example.com".into()]).await?;
//     let items = api.list_items(&list.id).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Summary of a remote domain list
///
/// Items are not part of the summary; they are fetched separately and
/// cached per list id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayList {
    /// Stable list identifier
    pub id: String,
    /// List name
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of items reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl GatewayList {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            count: None,
        }
    }
}

/// Summary of a remote filtering rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRule {
    /// Stable rule identifier
    pub id: String,
    /// Rule name
    pub name: String,
    /// Match expression referencing lists by id
    #[serde(default)]
    pub traffic: String,
    /// Whether the rule is active
    #[serde(default)]
    pub enabled: bool,
}

impl GatewayRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, traffic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            traffic: traffic.into(),
            enabled: true,
        }
    }
}

/// Trait for Gateway API transports
///
/// Every method performs exactly one API call and reports its outcome.
/// Implementations must not retry, sleep or cache: retry and rate limiting
/// are owned by [`crate::GatewayClient`], caching by [`crate::ListCache`].
///
/// Throttling responses (HTTP 429) must be reported as
/// [`crate::Error::RateLimited`] so the retry policy can tell them apart
/// from ordinary failures.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Fetch every list in the account
    async fn list_lists(&self) -> Result<Vec<GatewayList>, crate::Error>;

    /// Fetch the items of one list
    ///
    /// Only the first page (up to [`crate::config::MAX_LIST_SIZE`] items) is
    /// returned.
    async fn list_items(&self, list_id: &str) -> Result<Vec<String>, crate::Error>;

    /// Create a domain list populated with `domains`
    async fn create_list(&self, name: &str, domains: &[String])
    -> Result<GatewayList, crate::Error>;

    /// Remove and append items of an existing list in one call
    async fn update_list(
        &self,
        list_id: &str,
        remove: &[String],
        append: &[String],
    ) -> Result<GatewayList, crate::Error>;

    /// Delete a list
    async fn delete_list(&self, list_id: &str) -> Result<(), crate::Error>;

    /// Fetch every rule in the account
    async fn list_rules(&self) -> Result<Vec<GatewayRule>, crate::Error>;

    /// Create an enabled blocking rule with the given match expression
    async fn create_rule(&self, name: &str, traffic: &str) -> Result<GatewayRule, crate::Error>;

    /// Replace the name and match expression of a rule
    async fn update_rule(
        &self,
        rule_id: &str,
        name: &str,
        traffic: &str,
    ) -> Result<GatewayRule, crate::Error>;

    /// Delete a rule
    async fn delete_rule(&self, rule_id: &str) -> Result<(), crate::Error>;

    /// Transport name (for logging)
    fn provider_name(&self) -> &'static str;
}
