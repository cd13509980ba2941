//! Test doubles and common utilities for contract tests
//!
//! This module provides an in-memory Gateway and a scripted pipeline that
//! record every call, so tests can assert on exactly what reached the
//! "remote" side.

#![allow(dead_code)]

use gwsync_core::error::{Error, Result};
use gwsync_core::traits::{
    GatewayApi, GatewayList, GatewayRule, PipelineCacheEntry, PipelineRun, PipelineStatus,
};
use gwsync_core::{
    CacheStore, GatewayClient, ListCache, RateLimiter, ReconcileConfig, Reconciler, RetryPolicy,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const PREFIX: &str = "Block ads";

/// Kind of failure a scripted call reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// HTTP 429
    Throttled,
    /// HTTP 5xx
    Server,
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Throttled => Error::rate_limited("429 Too Many Requests"),
            Failure::Server => Error::api("fake", "503 Service Unavailable"),
        }
    }
}

/// One recorded `update_list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUpdate {
    pub list_id: String,
    pub remove: Vec<String>,
    pub append: Vec<String>,
}

#[derive(Default)]
struct GatewayState {
    next_id: u64,
    lists: Vec<(GatewayList, Vec<String>)>,
    rules: Vec<GatewayRule>,
    calls: HashMap<&'static str, usize>,
    successful_mutations: usize,
    mutation_completions: Vec<Instant>,
    updates: Vec<ListUpdate>,
    scripted: VecDeque<Failure>,
    persistent: Option<(Failure, usize)>,
    fail_reads: bool,
}

impl GatewayState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        fake_id(self.next_id)
    }

    fn begin_read(&mut self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.fail_reads {
            return Err(Failure::Server.into_error());
        }
        Ok(())
    }

    fn begin_mutation(&mut self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(failure) = self.scripted.pop_front() {
            return Err(failure.into_error());
        }
        if let Some((failure, after)) = self.persistent {
            if self.successful_mutations >= after {
                return Err(failure.into_error());
            }
        }
        Ok(())
    }

    fn finish_mutation(&mut self) {
        self.successful_mutations += 1;
        self.mutation_completions.push(Instant::now());
    }
}

/// UUID-shaped identifier, so rule expressions can be parsed back
pub fn fake_id(n: u64) -> String {
    format!("0a1b2c3d-0000-4000-8000-{:012x}", n)
}

/// In-memory Gateway that behaves like the real service for our purposes
///
/// Clones share state, so a test can keep one handle and give another to
/// the client under test.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a list directly, bypassing call accounting
    pub fn seed_list(&self, name: &str, items: Vec<String>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id();
        let mut list = GatewayList::new(id.clone(), name);
        list.count = Some(items.len() as u64);
        state.lists.push((list, items));
        id
    }

    /// Add a rule directly, bypassing call accounting
    pub fn seed_rule(&self, name: &str, traffic: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id();
        state.rules.push(GatewayRule::new(id.clone(), name, traffic));
        id
    }

    /// Fail the next mutations, in order, with these failures
    pub fn script_failures(&self, failures: Vec<Failure>) {
        self.state.lock().unwrap().scripted.extend(failures);
    }

    /// Fail every mutation once `after` mutations have succeeded
    pub fn fail_mutations_after(&self, after: usize, failure: Failure) {
        self.state.lock().unwrap().persistent = Some((failure, after));
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.scripted.clear();
        state.persistent = None;
        state.fail_reads = false;
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    /// Successful mutations so far
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().successful_mutations
    }

    pub fn mutation_completions(&self) -> Vec<Instant> {
        self.state.lock().unwrap().mutation_completions.clone()
    }

    pub fn updates(&self) -> Vec<ListUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn lists(&self) -> Vec<GatewayList> {
        let state = self.state.lock().unwrap();
        state.lists.iter().map(|(list, _)| list.clone()).collect()
    }

    pub fn items(&self, list_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .lists
            .iter()
            .find(|(list, _)| list.id == list_id)
            .map(|(_, items)| items.clone())
            .unwrap_or_default()
    }

    pub fn rules(&self) -> Vec<GatewayRule> {
        self.state.lock().unwrap().rules.clone()
    }
}

#[async_trait::async_trait]
impl GatewayApi for FakeGateway {
    async fn list_lists(&self) -> Result<Vec<GatewayList>> {
        let mut state = self.state.lock().unwrap();
        state.begin_read("list_lists")?;
        Ok(state.lists.iter().map(|(list, _)| list.clone()).collect())
    }

    async fn list_items(&self, list_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.begin_read("list_items")?;
        state
            .lists
            .iter()
            .find(|(list, _)| list.id == list_id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| Error::not_found(list_id.to_string()))
    }

    async fn create_list(&self, name: &str, domains: &[String]) -> Result<GatewayList> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("create_list")?;
        if domains.len() > gwsync_core::config::MAX_LIST_SIZE {
            return Err(Error::api("fake", "list too large"));
        }

        let id = state.new_id();
        let mut list = GatewayList::new(id, name);
        list.count = Some(domains.len() as u64);
        state.lists.push((list.clone(), domains.to_vec()));
        state.finish_mutation();
        Ok(list)
    }

    async fn update_list(
        &self,
        list_id: &str,
        remove: &[String],
        append: &[String],
    ) -> Result<GatewayList> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("update_list")?;

        let (list, items) = state
            .lists
            .iter_mut()
            .find(|(list, _)| list.id == list_id)
            .ok_or_else(|| Error::not_found(list_id.to_string()))?;
        items.retain(|item| !remove.contains(item));
        items.extend(append.iter().cloned());
        list.count = Some(items.len() as u64);
        let list = list.clone();

        state.updates.push(ListUpdate {
            list_id: list_id.to_string(),
            remove: remove.to_vec(),
            append: append.to_vec(),
        });
        state.finish_mutation();
        Ok(list)
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("delete_list")?;

        // Like the real service, refuse to delete a list a rule still uses.
        if state.rules.iter().any(|rule| rule.traffic.contains(list_id)) {
            return Err(Error::api("fake", format!("list {} is in use", list_id)));
        }
        state.lists.retain(|(list, _)| list.id != list_id);
        state.finish_mutation();
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<GatewayRule>> {
        let mut state = self.state.lock().unwrap();
        state.begin_read("list_rules")?;
        Ok(state.rules.clone())
    }

    async fn create_rule(&self, name: &str, traffic: &str) -> Result<GatewayRule> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("create_rule")?;

        let id = state.new_id();
        let rule = GatewayRule::new(id, name, traffic);
        state.rules.push(rule.clone());
        state.finish_mutation();
        Ok(rule)
    }

    async fn update_rule(&self, rule_id: &str, name: &str, traffic: &str) -> Result<GatewayRule> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("update_rule")?;

        let rule = state
            .rules
            .iter_mut()
            .find(|rule| rule.id == rule_id)
            .ok_or_else(|| Error::not_found(rule_id.to_string()))?;
        rule.name = name.to_string();
        rule.traffic = traffic.to_string();
        let rule = rule.clone();
        state.finish_mutation();
        Ok(rule)
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.begin_mutation("delete_rule")?;
        state.rules.retain(|rule| rule.id != rule_id);
        state.finish_mutation();
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
struct PipelineState {
    runs: Vec<PipelineRun>,
    caches: Vec<PipelineCacheEntry>,
    fail_status: bool,
    fail_housekeeping: bool,
    status_calls: usize,
    deleted_runs: Vec<u64>,
    deleted_caches: Vec<u64>,
}

/// Pipeline whose run history is set by the test
#[derive(Clone, Default)]
pub struct ScriptedPipeline {
    state: Arc<Mutex<PipelineState>>,
}

impl ScriptedPipeline {
    /// Pipeline reporting `runs`, newest first, given as (id, status, conclusion)
    pub fn with_runs(runs: &[(u64, &str, Option<&str>)]) -> Self {
        let pipeline = Self::default();
        {
            let mut state = pipeline.state.lock().unwrap();
            state.runs = runs
                .iter()
                .map(|&(id, status, conclusion)| PipelineRun {
                    id,
                    status: status.to_string(),
                    conclusion: conclusion.map(str::to_string),
                    created_at: None,
                })
                .collect();
            state.caches = vec![
                PipelineCacheEntry {
                    id: 901,
                    key: "gwsync-cache-1".to_string(),
                },
                PipelineCacheEntry {
                    id: 902,
                    key: "gwsync-cache-2".to_string(),
                },
            ];
        }
        pipeline
    }

    /// Pipeline whose last completed run concluded `conclusion`
    pub fn last_completed(conclusion: &str) -> Self {
        Self::with_runs(&[
            (3, "in_progress", None),
            (2, "completed", Some(conclusion)),
            (1, "completed", Some("success")),
        ])
    }

    pub fn fail_status(&self) {
        self.state.lock().unwrap().fail_status = true;
    }

    pub fn fail_housekeeping(&self) {
        self.state.lock().unwrap().fail_housekeeping = true;
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn deleted_runs(&self) -> Vec<u64> {
        self.state.lock().unwrap().deleted_runs.clone()
    }

    pub fn deleted_caches(&self) -> Vec<u64> {
        self.state.lock().unwrap().deleted_caches.clone()
    }
}

#[async_trait::async_trait]
impl PipelineStatus for ScriptedPipeline {
    async fn recent_runs(&self, limit: u32) -> Result<Vec<PipelineRun>> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        if state.fail_status {
            return Err(Error::api("pipeline", "502 Bad Gateway"));
        }
        Ok(state.runs.iter().take(limit as usize).cloned().collect())
    }

    async fn delete_run(&self, run_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_housekeeping {
            return Err(Error::api("pipeline", "403 Forbidden"));
        }
        state.deleted_runs.push(run_id);
        Ok(())
    }

    async fn list_caches(&self) -> Result<Vec<PipelineCacheEntry>> {
        let state = self.state.lock().unwrap();
        if state.fail_housekeeping {
            return Err(Error::api("pipeline", "403 Forbidden"));
        }
        Ok(state.caches.clone())
    }

    async fn delete_cache(&self, cache_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_housekeeping {
            return Err(Error::api("pipeline", "403 Forbidden"));
        }
        state.deleted_caches.push(cache_id);
        Ok(())
    }
}

/// `n` distinct, sorted domains
pub fn domains(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("d{:05}.example.com", i)).collect()
}

/// Client over `gateway` with production retry and rate limiting defaults
pub fn client(gateway: &FakeGateway) -> GatewayClient {
    GatewayClient::new(
        Box::new(gateway.clone()),
        RetryPolicy::default(),
        RateLimiter::new(Duration::from_secs(1)),
    )
}

/// Reconciler over `gateway`, loading its cache from `cache_path`
pub async fn reconciler(
    gateway: &FakeGateway,
    cache_path: &Path,
    max_list_size: usize,
) -> Reconciler {
    let cache = ListCache::open(CacheStore::new(cache_path), None, 5).await;
    let config = ReconcileConfig::new(PREFIX).with_max_list_size(max_list_size);
    Reconciler::new(client(gateway), cache, &config).expect("valid reconcile config")
}
