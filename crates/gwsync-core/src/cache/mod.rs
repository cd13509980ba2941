// # Durable Cache
//
// Cross-invocation cache of remote lists, rules and per-list items.
//
// - `CacheStore` owns the snapshot file and decides whether it can be trusted
// - `ListCache` owns the in-memory snapshot during a run and fills it
//   read-through from the Gateway, persisting after every change

pub mod file;
pub mod list_cache;

pub use file::CacheStore;
pub use list_cache::ListCache;

use crate::traits::{GatewayList, GatewayRule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything known about the remote state
///
/// Serialized as `{"lists": [...], "rules": [...], "mapping": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Known list summaries
    #[serde(default)]
    pub lists: Vec<GatewayList>,

    /// Known rule summaries
    #[serde(default)]
    pub rules: Vec<GatewayRule>,

    /// Items per list id
    #[serde(default, rename = "mapping")]
    pub item_mapping: HashMap<String, Vec<String>>,
}

impl CacheSnapshot {
    /// An empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.rules.is_empty() && self.item_mapping.is_empty()
    }
}
