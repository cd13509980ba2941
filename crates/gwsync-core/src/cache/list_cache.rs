//! Read-through, write-through view of the snapshot for one run
//!
//! Accessors return cached data when present and otherwise fetch it through
//! the [`GatewayClient`], store it and persist immediately. The `record_*`
//! methods apply a mutation that already succeeded remotely and persist
//! before returning, so a crash loses at most the in-flight operation.

use super::{CacheSnapshot, CacheStore};
use crate::client::GatewayClient;
use crate::error::Result;
use crate::traits::{GatewayList, GatewayRule, PipelineStatus};
use tracing::debug;

/// Snapshot owned by a single run, backed by a [`CacheStore`]
#[derive(Debug)]
pub struct ListCache {
    store: CacheStore,
    snapshot: CacheSnapshot,
}

impl ListCache {
    /// Wrap an already loaded snapshot
    pub fn new(store: CacheStore, snapshot: CacheSnapshot) -> Self {
        Self { store, snapshot }
    }

    /// Load the snapshot through `store` and wrap it
    pub async fn open(
        store: CacheStore,
        pipeline: Option<&dyn PipelineStatus>,
        runs_to_inspect: u32,
    ) -> Self {
        let snapshot = store.load(pipeline, runs_to_inspect).await;
        Self::new(store, snapshot)
    }

    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> CacheSnapshot {
        self.snapshot
    }

    async fn persist(&self) -> Result<()> {
        self.store.save(&self.snapshot).await
    }

    /// Lists owned by `prefix`
    ///
    /// Cached lists are used when at least one of them matches the prefix.
    pub async fn lists(&mut self, client: &GatewayClient, prefix: &str) -> Result<Vec<GatewayList>> {
        let cached: Vec<GatewayList> = self
            .snapshot
            .lists
            .iter()
            .filter(|list| list.name.starts_with(prefix))
            .cloned()
            .collect();
        if !cached.is_empty() {
            debug!(prefix, count = cached.len(), "Lists served from cache");
            return Ok(cached);
        }

        let fetched = client.list_lists(prefix).await?;
        self.snapshot
            .lists
            .retain(|list| !list.name.starts_with(prefix));
        self.snapshot.lists.extend(fetched.iter().cloned());
        self.persist().await?;
        Ok(fetched)
    }

    /// Rules owned by `prefix`
    ///
    /// Cached rules are used when at least one of them matches the prefix.
    pub async fn rules(&mut self, client: &GatewayClient, prefix: &str) -> Result<Vec<GatewayRule>> {
        let cached: Vec<GatewayRule> = self
            .snapshot
            .rules
            .iter()
            .filter(|rule| rule.name.starts_with(prefix))
            .cloned()
            .collect();
        if !cached.is_empty() {
            debug!(prefix, count = cached.len(), "Rules served from cache");
            return Ok(cached);
        }

        let fetched = client.list_rules(prefix).await?;
        self.snapshot
            .rules
            .retain(|rule| !rule.name.starts_with(prefix));
        self.snapshot.rules.extend(fetched.iter().cloned());
        self.persist().await?;
        Ok(fetched)
    }

    /// Items of a list, cached per list id
    pub async fn items(&mut self, client: &GatewayClient, list_id: &str) -> Result<Vec<String>> {
        if let Some(items) = self.snapshot.item_mapping.get(list_id) {
            debug!(list_id, count = items.len(), "Items served from cache");
            return Ok(items.clone());
        }

        let fetched = client.list_items(list_id).await?;
        self.snapshot
            .item_mapping
            .insert(list_id.to_string(), fetched.clone());
        self.persist().await?;
        Ok(fetched)
    }

    /// Record a newly created list and its items
    pub async fn record_list_created(&mut self, list: GatewayList, items: Vec<String>) -> Result<()> {
        self.snapshot.item_mapping.insert(list.id.clone(), items);
        upsert_list(&mut self.snapshot.lists, list);
        self.persist().await
    }

    /// Record the new contents of an updated list
    pub async fn record_list_updated(&mut self, list: GatewayList, items: Vec<String>) -> Result<()> {
        self.snapshot.item_mapping.insert(list.id.clone(), items);
        upsert_list(&mut self.snapshot.lists, list);
        self.persist().await
    }

    /// Forget a deleted list and its items
    pub async fn record_list_deleted(&mut self, list_id: &str) -> Result<()> {
        self.snapshot.lists.retain(|list| list.id != list_id);
        self.snapshot.item_mapping.remove(list_id);
        self.persist().await
    }

    /// Record a created or updated rule
    pub async fn record_rule(&mut self, rule: GatewayRule) -> Result<()> {
        match self.snapshot.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.snapshot.rules.push(rule),
        }
        self.persist().await
    }

    /// Forget a deleted rule
    pub async fn record_rule_deleted(&mut self, rule_id: &str) -> Result<()> {
        self.snapshot.rules.retain(|rule| rule.id != rule_id);
        self.persist().await
    }
}

fn upsert_list(lists: &mut Vec<GatewayList>, list: GatewayList) {
    match lists.iter_mut().find(|l| l.id == list.id) {
        Some(existing) => *existing = list,
        None => lists.push(list),
    }
}
