//! Rule match expressions
//!
//! A rule blocks a query when its domain is in any of the rule's lists:
//!
//! ```text
//! any(dns.domains[*] in $<list-id>) or any(dns.domains[*] in $<list-id>) ...
//! ```
//!
//! Expressions are only ever generated by [`build_traffic`]. Going the other
//! way needs no parser: list ids are UUIDs, so a fixed pattern finds them.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static LIST_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("list id pattern is valid")
});

/// Membership predicate for one list
pub fn list_predicate(list_id: &str) -> String {
    format!("any(dns.domains[*] in ${})", list_id)
}

/// OR together one membership predicate per list, in the given order
pub fn build_traffic<S: AsRef<str>>(list_ids: &[S]) -> String {
    list_ids
        .iter()
        .map(|id| list_predicate(id.as_ref()))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Every list id referenced by an expression
///
/// An empty expression references nothing.
pub fn extract_list_ids(traffic: &str) -> BTreeSet<String> {
    LIST_ID_PATTERN
        .find_iter(traffic)
        .map(|m| m.as_str().to_string())
        .collect()
}
