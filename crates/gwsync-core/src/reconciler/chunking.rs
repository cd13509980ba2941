//! Chunking of the desired domains and positional ordering of lists

use crate::traits::GatewayList;
use regex::Regex;
use std::sync::LazyLock;

static LIST_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*$").expect("list number pattern is valid"));

/// Split `domains` into consecutive slices of at most `size` items
///
/// # Panics
///
/// Panics if `size` is zero; [`crate::config::ReconcileConfig::validate`]
/// rejects that value.
pub fn chunk_domains(domains: &[String], size: usize) -> Vec<&[String]> {
    domains.chunks(size).collect()
}

/// Name of the list at `number` for `prefix`
pub fn list_name(prefix: &str, number: u64) -> String {
    format!("{} - {:03}", prefix, number)
}

/// Numeric suffix of a list name
pub fn list_number(name: &str) -> Option<u64> {
    LIST_NUMBER_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Order lists by numeric suffix; lists without one go last, in their
/// original relative order
pub fn sort_by_list_number(lists: &mut [GatewayList]) {
    lists.sort_by_key(|list| match list_number(&list.name) {
        Some(number) => (false, number),
        None => (true, 0),
    });
}
