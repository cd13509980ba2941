//! Block list reconciler
//!
//! The Reconciler is responsible for:
//! - Splitting the desired domains into list-sized chunks
//! - Pairing chunks with the existing lists owned by a name prefix
//! - Issuing the smallest set of list and rule mutations that converges
//!   the Gateway on the desired state
//! - Recording every applied mutation in the cache
//!
//! ## Architecture
//!
//! ```text
//!                  desired domains
//!                         │
//!                         ▼
//!                ┌────────────────┐
//!                │   Reconciler   │
//!                └────────────────┘
//!                   │          │
//!        read-through          mutations
//!                   ▼          ▼
//!          ┌────────────┐   ┌───────────────┐
//!          │ ListCache  │   │ GatewayClient │── RateLimited(Retried(call))
//!          └────────────┘   └───────────────┘
//!                 │                 │
//!                 ▼                 ▼
//!          ┌────────────┐   ┌───────────────┐
//!          │ CacheStore │   │  GatewayApi   │
//!          └────────────┘   └───────────────┘
//! ```
//!
//! ## Mutation Order
//!
//! 1. Update lists paired with a chunk, create lists for leftover chunks
//! 2. Point the prefix's rule at exactly the surviving lists
//! 3. Delete surplus lists, which no rule references any more
//!
//! Every step diffs against current state, so a rerun after a failure
//! picks up where the previous run stopped.

mod chunking;

pub use chunking::{chunk_domains, list_name, list_number, sort_by_list_number};

use crate::cache::ListCache;
use crate::client::GatewayClient;
use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::expression::{build_traffic, extract_list_ids};
use crate::traits::{GatewayList, GatewayRule};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// What a reconciliation run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Number of desired domains after de-duplication
    pub domains: usize,
    pub lists_created: usize,
    pub lists_updated: usize,
    pub lists_unchanged: usize,
    pub lists_deleted: usize,
    pub rules_created: usize,
    pub rules_updated: usize,
    pub rules_unchanged: usize,
    pub rules_deleted: usize,
}

impl ReconcileReport {
    /// Number of remote mutations issued
    pub fn mutations(&self) -> usize {
        self.lists_created
            + self.lists_updated
            + self.lists_deleted
            + self.rules_created
            + self.rules_updated
            + self.rules_deleted
    }
}

/// Converges the Gateway lists and rule owned by one prefix
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::run()`] with the desired domains
/// 3. Inspect the cache with [`Reconciler::cache()`] if needed
///
/// All remote calls are awaited one after another; the reconciler never
/// issues two mutations concurrently.
pub struct Reconciler {
    client: GatewayClient,
    cache: ListCache,
    prefix: String,
    rule_name: String,
    max_list_size: usize,
}

impl Reconciler {
    /// Create a reconciler
    ///
    /// # Parameters
    ///
    /// - `client`: Gateway client (owns retry and rate limiting)
    /// - `cache`: Snapshot loaded for this run
    /// - `config`: Prefix and list size
    pub fn new(client: GatewayClient, cache: ListCache, config: &ReconcileConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            client,
            cache,
            prefix: config.prefix.clone(),
            rule_name: config.prefix.clone(),
            max_list_size: config.max_list_size,
        })
    }

    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// Release the client and cache
    pub fn into_parts(self) -> (GatewayClient, ListCache) {
        (self.client, self.cache)
    }

    /// Converge the Gateway on `desired`
    ///
    /// `desired` should be in a stable order: chunk boundaries, and so the
    /// assignment of domains to lists, follow it. Duplicates are dropped,
    /// keeping the first occurrence.
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileReport)`: Every mutation succeeded
    /// - `Err(Error)`: A read failed or a mutation exhausted its retries;
    ///   mutations applied before the failure stay recorded in the cache
    pub async fn run(&mut self, desired: &[String]) -> Result<ReconcileReport> {
        let mut seen = HashSet::new();
        let desired: Vec<String> = desired
            .iter()
            .filter(|domain| seen.insert(domain.as_str()))
            .cloned()
            .collect();

        let mut report = ReconcileReport {
            domains: desired.len(),
            ..ReconcileReport::default()
        };

        let mut lists = self.cache.lists(&self.client, &self.prefix).await?;
        let rules = self.cache.rules(&self.client, &self.prefix).await?;
        sort_by_list_number(&mut lists);

        let chunks = chunk_domains(&desired, self.max_list_size);
        info!(
            prefix = %self.prefix,
            domains = desired.len(),
            chunks = chunks.len(),
            lists = lists.len(),
            rules = rules.len(),
            "Reconciling"
        );

        let mut used_numbers: BTreeSet<u64> =
            lists.iter().filter_map(|list| list_number(&list.name)).collect();
        let existing = lists.len();
        let mut backing_ids: Vec<String> = Vec::with_capacity(chunks.len());
        let mut surplus: Vec<GatewayList> = Vec::new();

        for (position, list) in lists.into_iter().enumerate() {
            match chunks.get(position) {
                Some(chunk) => {
                    backing_ids.push(list.id.clone());
                    self.converge_list(list, chunk, &mut report).await?;
                }
                None => surplus.push(list),
            }
        }

        for chunk in chunks.iter().skip(existing) {
            let number = next_list_number(&mut used_numbers);
            let name = list_name(&self.prefix, number);
            info!(list = %name, items = chunk.len(), "Creating list");

            let mut created = self.client.create_list(&name, chunk).await?;
            created.count = Some(chunk.len() as u64);
            backing_ids.push(created.id.clone());
            self.cache.record_list_created(created, chunk.to_vec()).await?;
            report.lists_created += 1;
        }

        self.converge_rules(rules, &backing_ids, &mut report).await?;

        for list in surplus {
            info!(list = %list.name, id = %list.id, "Deleting surplus list");
            self.client.delete_list(&list.id).await?;
            self.cache.record_list_deleted(&list.id).await?;
            report.lists_deleted += 1;
        }

        info!(
            created = report.lists_created,
            updated = report.lists_updated,
            unchanged = report.lists_unchanged,
            deleted = report.lists_deleted,
            mutations = report.mutations(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Make one existing list hold exactly `chunk`
    async fn converge_list(
        &mut self,
        list: GatewayList,
        chunk: &[String],
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let current = self.cache.items(&self.client, &list.id).await?;

        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
        let chunk_set: HashSet<&str> = chunk.iter().map(String::as_str).collect();

        let remove: Vec<String> = current
            .iter()
            .filter(|domain| !chunk_set.contains(domain.as_str()))
            .cloned()
            .collect();
        let append: Vec<String> = chunk
            .iter()
            .filter(|domain| !current_set.contains(domain.as_str()))
            .cloned()
            .collect();

        if remove.is_empty() && append.is_empty() {
            debug!(list = %list.name, "List already up to date");
            report.lists_unchanged += 1;
            return Ok(());
        }

        info!(
            list = %list.name,
            removed = remove.len(),
            appended = append.len(),
            "Updating list"
        );
        self.client.update_list(&list.id, &remove, &append).await?;

        let summary = GatewayList {
            count: Some(chunk.len() as u64),
            ..list
        };
        self.cache.record_list_updated(summary, chunk.to_vec()).await?;
        report.lists_updated += 1;
        Ok(())
    }

    /// Make the prefix's rules reference exactly `backing_ids`
    async fn converge_rules(
        &mut self,
        rules: Vec<GatewayRule>,
        backing_ids: &[String],
        report: &mut ReconcileReport,
    ) -> Result<()> {
        // A rule cannot match on zero lists.
        if backing_ids.is_empty() {
            for rule in rules {
                info!(rule = %rule.name, id = %rule.id, "Deleting rule with no lists left");
                self.client.delete_rule(&rule.id).await?;
                self.cache.record_rule_deleted(&rule.id).await?;
                report.rules_deleted += 1;
            }
            return Ok(());
        }

        if rules.is_empty() {
            info!(rule = %self.rule_name, lists = backing_ids.len(), "Creating rule");
            let created = self.client.create_rule(&self.rule_name, backing_ids).await?;
            self.cache
                .record_rule(with_traffic(created, backing_ids))
                .await?;
            report.rules_created += 1;
            return Ok(());
        }

        let wanted: BTreeSet<String> = backing_ids.iter().cloned().collect();
        for rule in rules {
            if extract_list_ids(&rule.traffic) == wanted {
                debug!(rule = %rule.name, "Rule already references every list");
                report.rules_unchanged += 1;
                continue;
            }

            info!(rule = %rule.name, lists = backing_ids.len(), "Updating rule");
            let updated = self
                .client
                .update_rule(&rule.id, &rule.name, backing_ids)
                .await?;
            self.cache
                .record_rule(with_traffic(updated, backing_ids))
                .await?;
            report.rules_updated += 1;
        }
        Ok(())
    }
}

/// Fill in the expression when the service omitted it from its response
fn with_traffic(mut rule: GatewayRule, list_ids: &[String]) -> GatewayRule {
    if rule.traffic.is_empty() {
        rule.traffic = build_traffic(list_ids);
    }
    rule
}

/// Smallest positive list number not taken yet
fn next_list_number(used: &mut BTreeSet<u64>) -> u64 {
    let mut number = 1;
    while used.contains(&number) {
        number += 1;
    }
    used.insert(number);
    number
}
