//! Architectural Contract Test: Reconciliation
//!
//! This test verifies that a reconciliation run converges the Gateway on
//! the desired domains with the minimal set of mutations.
//!
//! Constraints verified:
//! - Domains are split into lists of at most `max_list_size` items
//! - The prefix's rule references exactly the surviving lists
//! - A second run with unchanged input issues no mutations
//! - Surplus lists are deleted only after the rule stops referencing them
//! - Progress survives a failed run and a rerun completes the work
//! - Mutations are spaced by the rate limiter
//!
//! If this test fails, the Gateway can drift from the blocklists.

mod common;

use common::*;
use gwsync_core::Error;
use gwsync_core::expression::extract_list_ids;
use gwsync_core::reconciler::list_number;
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::tempdir;

fn list_ids(gateway: &FakeGateway) -> BTreeSet<String> {
    gateway.lists().into_iter().map(|list| list.id).collect()
}

fn rule_list_ids(gateway: &FakeGateway) -> BTreeSet<String> {
    let rules = gateway.rules();
    assert_eq!(rules.len(), 1, "exactly one rule owned by the prefix");
    extract_list_ids(&rules[0].traffic)
}

#[tokio::test(start_paused = true)]
async fn initial_run_creates_lists_and_rule() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    let desired = domains(2500);

    let mut reconciler = reconciler(&gateway, &dir.path().join("cache.json"), 1000).await;
    let report = reconciler.run(&desired).await.expect("run succeeds");

    assert_eq!(report.lists_created, 3);
    assert_eq!(report.rules_created, 1);
    assert_eq!(report.mutations(), 4);

    let mut names: Vec<String> = gateway.lists().into_iter().map(|l| l.name).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["Block ads - 001", "Block ads - 002", "Block ads - 003"]
    );

    let sizes: Vec<usize> = gateway
        .lists()
        .iter()
        .map(|list| gateway.items(&list.id).len())
        .collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);

    assert_eq!(gateway.rules()[0].name, PREFIX);
    assert_eq!(rule_list_ids(&gateway), list_ids(&gateway));
}

#[tokio::test(start_paused = true)]
async fn unchanged_input_issues_no_mutations() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let gateway = FakeGateway::new();
    let desired = domains(2500);

    reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&desired)
        .await
        .expect("first run succeeds");
    let after_first = gateway.mutation_count();

    // Served entirely from the cache
    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&desired)
        .await
        .expect("cached run succeeds");
    assert_eq!(report.mutations(), 0);
    assert_eq!(report.lists_unchanged, 3);
    assert_eq!(report.rules_unchanged, 1);
    assert_eq!(gateway.mutation_count(), after_first);
    assert_eq!(gateway.calls("list_lists"), 1, "cached run must not list");

    // Rebuilt from the Gateway
    std::fs::remove_file(&cache_path).unwrap();
    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&desired)
        .await
        .expect("uncached run succeeds");
    assert_eq!(report.mutations(), 0);
    assert_eq!(gateway.mutation_count(), after_first);
    assert_eq!(gateway.calls("list_items"), 3);
}

#[tokio::test(start_paused = true)]
async fn shrinking_deletes_surplus_list_after_rule_update() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let gateway = FakeGateway::new();

    reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&domains(2000))
        .await
        .expect("first run succeeds");
    let first = gateway
        .lists()
        .into_iter()
        .find(|list| list_number(&list.name) == Some(1))
        .unwrap();

    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&domains(500))
        .await
        .expect("shrinking run succeeds");

    assert_eq!(report.lists_updated, 1);
    assert_eq!(report.lists_deleted, 1);
    assert_eq!(report.rules_updated, 1);

    let remaining = gateway.lists();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, first.id);
    assert_eq!(gateway.items(&first.id), domains(500));

    let update = gateway.updates().pop().unwrap();
    assert_eq!(update.list_id, first.id);
    assert_eq!(update.remove.len(), 500);
    assert!(update.append.is_empty(), "shrinking only removes");

    assert_eq!(rule_list_ids(&gateway), BTreeSet::from([first.id]));
}

#[tokio::test(start_paused = true)]
async fn growth_appends_creates_and_updates_rule() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let gateway = FakeGateway::new();

    reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&domains(1500))
        .await
        .expect("first run succeeds");

    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&domains(2500))
        .await
        .expect("growth run succeeds");

    assert_eq!(report.lists_unchanged, 1);
    assert_eq!(report.lists_updated, 1);
    assert_eq!(report.lists_created, 1);
    assert_eq!(report.rules_updated, 1);

    let update = gateway.updates().pop().unwrap();
    assert!(update.remove.is_empty());
    assert_eq!(update.append.len(), 500);

    assert_eq!(gateway.lists().len(), 3);
    assert_eq!(rule_list_ids(&gateway), list_ids(&gateway));
}

#[tokio::test(start_paused = true)]
async fn empty_input_removes_rule_then_lists() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let gateway = FakeGateway::new();

    reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&domains(1200))
        .await
        .expect("first run succeeds");

    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&[])
        .await
        .expect("emptying run succeeds");

    assert_eq!(report.rules_deleted, 1);
    assert_eq!(report.lists_deleted, 2);
    assert!(gateway.rules().is_empty());
    assert!(gateway.lists().is_empty());
}

#[tokio::test(start_paused = true)]
async fn foreign_lists_and_rules_are_untouched() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    let foreign_list = gateway.seed_list("Allow corp - 001", vec!["corp.example.com".into()]);
    let foreign_rule = gateway.seed_rule(
        "Allow corp",
        &format!("any(dns.domains[*] in ${})", foreign_list),
    );

    reconciler(&gateway, &dir.path().join("cache.json"), 1000)
        .await
        .run(&domains(10))
        .await
        .expect("run succeeds");

    assert!(gateway.lists().iter().any(|list| list.id == foreign_list));
    assert!(gateway.rules().iter().any(|rule| rule.id == foreign_rule));
    assert_eq!(gateway.lists().len(), 2);
    assert_eq!(gateway.rules().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn new_lists_fill_numbering_gaps() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.seed_list("Block ads - 002", domains(10));

    reconciler(&gateway, &dir.path().join("cache.json"), 1000)
        .await
        .run(&domains(2500))
        .await
        .expect("run succeeds");

    let mut numbers: Vec<u64> = gateway
        .lists()
        .iter()
        .filter_map(|list| list_number(&list.name))
        .collect();
    numbers.sort();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_domains_are_collapsed() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    let mut desired = domains(3);
    desired.extend(domains(3));

    let report = reconciler(&gateway, &dir.path().join("cache.json"), 1000)
        .await
        .run(&desired)
        .await
        .expect("run succeeds");

    assert_eq!(report.domains, 3);
    let list = &gateway.lists()[0];
    assert_eq!(gateway.items(&list.id), domains(3));
}

#[tokio::test(start_paused = true)]
async fn rerun_after_failure_completes_the_work() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let gateway = FakeGateway::new();
    let desired = domains(2500);

    // The first list is created, every later mutation fails
    gateway.fail_mutations_after(1, Failure::Server);
    let result = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&desired)
        .await;

    match result {
        Err(Error::RetriesExhausted {
            operation,
            attempts,
            ..
        }) => {
            assert_eq!(operation, "create_list");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(gateway.lists().len(), 1);

    // The applied creation survived in the cache
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(saved["lists"].as_array().unwrap().len(), 1);

    gateway.clear_failures();
    let report = reconciler(&gateway, &cache_path, 1000)
        .await
        .run(&desired)
        .await
        .expect("rerun succeeds");

    assert_eq!(report.lists_unchanged, 1);
    assert_eq!(report.lists_created, 2);
    assert_eq!(report.rules_created, 1);
    assert_eq!(gateway.lists().len(), 3);
    assert_eq!(gateway.calls("list_lists"), 1, "rerun lists from cache");
    assert_eq!(rule_list_ids(&gateway), list_ids(&gateway));
}

#[tokio::test(start_paused = true)]
async fn throttling_delays_but_does_not_fail() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.script_failures(vec![Failure::Throttled; 8]);

    let report = reconciler(&gateway, &dir.path().join("cache.json"), 1000)
        .await
        .run(&domains(10))
        .await
        .expect("throttled run succeeds");

    assert_eq!(report.lists_created, 1);
    assert_eq!(gateway.calls("create_list"), 9);
}

#[tokio::test(start_paused = true)]
async fn mutations_are_spaced_by_the_rate_limiter() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();

    reconciler(&gateway, &dir.path().join("cache.json"), 100)
        .await
        .run(&domains(550))
        .await
        .expect("run succeeds");

    let completions = gateway.mutation_completions();
    assert_eq!(completions.len(), 7);
    for pair in completions.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_secs(1),
            "mutations completed {:?} apart",
            pair[1] - pair[0]
        );
    }
}
