//! Blocklist file loading
//!
//! Accepted line formats:
//!
//! ```text
//! # comment
//! ads.example.com
//! 0.0.0.0 tracker.example.net      # hosts file
//! 0.0.0.0 a.example.com b.example.com
//! ||metrics.example.org^           # adblock domain anchor
//! ```
//!
//! Entries are lowercased, invalid names are dropped, and the union of all
//! files comes back sorted so chunk boundaries are stable across runs.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Addresses hosts-file style lists point blocked names at
const SINK_ADDRESSES: &[&str] = &["0.0.0.0", "127.0.0.1", "::", "::1"];

/// Names that appear in hosts files but must never be blocked
const RESERVED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
];

/// Extract the domains of one blocklist, in file order
pub fn parse_blocklist(content: &str) -> Vec<String> {
    content.lines().flat_map(parse_line).collect()
}

fn parse_line(line: &str) -> Vec<String> {
    let line = match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    };
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Vec::new();
    };

    // A hosts entry may map several names to the sink
    if SINK_ADDRESSES.contains(&first) {
        return tokens.filter_map(normalize).collect();
    }
    if tokens.next().is_some() {
        debug!("Skipping unrecognized blocklist line: {}", line.trim());
        return Vec::new();
    }
    normalize(first).into_iter().collect()
}

fn normalize(candidate: &str) -> Option<String> {
    let candidate = candidate
        .strip_prefix("||")
        .and_then(|rest| rest.strip_suffix('^'))
        .unwrap_or(candidate);
    let domain = candidate.trim_end_matches('.').to_ascii_lowercase();

    if RESERVED_NAMES.contains(&domain.as_str()) || domain.parse::<IpAddr>().is_ok() {
        return None;
    }
    if !is_valid_domain(&domain) {
        debug!("Skipping invalid domain: {}", domain);
        return None;
    }
    Some(domain)
}

/// Basic domain name check (RFC 1035 lengths, letters, digits, hyphen, underscore)
///
/// Single-label names are rejected: the Gateway only matches fully
/// qualified names.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Load and merge blocklist files into a sorted, de-duplicated sequence
pub async fn load_blocklists<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    if paths.is_empty() {
        return Err(Error::invalid_input("No blocklist files given"));
    }

    let mut domains = BTreeSet::new();
    for path in paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::invalid_input(format!(
                "Failed to read blocklist {}: {}",
                path.display(),
                e
            ))
        })?;

        let parsed = parse_blocklist(&content);
        info!("Loaded {} domains from {}", parsed.len(), path.display());
        domains.extend(parsed);
    }

    Ok(domains.into_iter().collect())
}
