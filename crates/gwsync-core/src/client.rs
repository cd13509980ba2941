//! Typed Gateway client
//!
//! [`GatewayClient`] turns reconciliation intent into calls on a
//! [`GatewayApi`] transport. Mutations go through the client's
//! [`RateLimiter`] and [`RetryPolicy`]; reads hit the transport directly and
//! surface their errors to the caller unretried.

use crate::config::{MAX_LIST_SIZE, SyncConfig};
use crate::error::Result;
use crate::expression::build_traffic;
use crate::retry::{RateLimiter, RetryPolicy};
use crate::traits::{GatewayApi, GatewayList, GatewayRule};
use std::future::Future;
use tracing::{debug, warn};

/// Gateway client with retry and rate limiting on mutations
pub struct GatewayClient {
    api: Box<dyn GatewayApi>,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("api", &self.api.provider_name())
            .field("retry", &self.retry)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl GatewayClient {
    /// Create a client from a transport and explicit policies
    pub fn new(api: Box<dyn GatewayApi>, retry: RetryPolicy, limiter: RateLimiter) -> Self {
        Self {
            api,
            retry,
            limiter,
        }
    }

    /// Create a client with the policies described by `config`
    pub fn from_config(api: Box<dyn GatewayApi>, config: &SyncConfig) -> Self {
        Self::new(
            api,
            RetryPolicy::new(&config.retry),
            RateLimiter::from_config(&config.rate_limit),
        )
    }

    pub fn provider_name(&self) -> &'static str {
        self.api.provider_name()
    }

    async fn mutate<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.limiter
            .run(move || self.retry.execute(operation, op))
            .await
    }

    /// Lists whose name starts with `prefix`, in service order
    pub async fn list_lists(&self, prefix: &str) -> Result<Vec<GatewayList>> {
        let lists = self.api.list_lists().await?;
        let owned: Vec<GatewayList> = lists
            .into_iter()
            .filter(|list| list.name.starts_with(prefix))
            .collect();
        debug!(prefix, count = owned.len(), "Fetched lists");
        Ok(owned)
    }

    /// Items of a list
    ///
    /// Only the first page is fetched. A list at the service cap is assumed
    /// to be complete.
    pub async fn list_items(&self, list_id: &str) -> Result<Vec<String>> {
        let items = self.api.list_items(list_id).await?;
        if is_full_page(items.len()) {
            warn!(
                list_id,
                count = items.len(),
                "Full page of items returned, later pages are not fetched"
            );
        }
        debug!(list_id, count = items.len(), "Fetched list items");
        Ok(items)
    }

    /// Rules whose name starts with `prefix`, in service order
    pub async fn list_rules(&self, prefix: &str) -> Result<Vec<GatewayRule>> {
        let rules = self.api.list_rules().await?;
        let owned: Vec<GatewayRule> = rules
            .into_iter()
            .filter(|rule| rule.name.starts_with(prefix))
            .collect();
        debug!(prefix, count = owned.len(), "Fetched rules");
        Ok(owned)
    }

    pub async fn create_list(&self, name: &str, domains: &[String]) -> Result<GatewayList> {
        self.mutate("create_list", move || self.api.create_list(name, domains))
            .await
    }

    pub async fn delete_list(&self, list_id: &str) -> Result<()> {
        self.mutate("delete_list", move || self.api.delete_list(list_id))
            .await
    }

    pub async fn update_list(
        &self,
        list_id: &str,
        remove: &[String],
        append: &[String],
    ) -> Result<GatewayList> {
        self.mutate("update_list", move || {
            self.api.update_list(list_id, remove, append)
        })
        .await
    }

    /// Create a rule matching any of `list_ids`
    pub async fn create_rule(&self, name: &str, list_ids: &[String]) -> Result<GatewayRule> {
        let traffic = build_traffic(list_ids);
        let traffic = traffic.as_str();
        self.mutate("create_rule", move || self.api.create_rule(name, traffic))
            .await
    }

    /// Point an existing rule at exactly `list_ids`
    pub async fn update_rule(
        &self,
        rule_id: &str,
        name: &str,
        list_ids: &[String],
    ) -> Result<GatewayRule> {
        let traffic = build_traffic(list_ids);
        let traffic = traffic.as_str();
        self.mutate("update_rule", move || {
            self.api.update_rule(rule_id, name, traffic)
        })
        .await
    }

    pub async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        self.mutate("delete_rule", move || self.api.delete_rule(rule_id))
            .await
    }
}

/// A full page may hide later pages, which are never fetched
fn is_full_page(count: usize) -> bool {
    count >= MAX_LIST_SIZE
}
