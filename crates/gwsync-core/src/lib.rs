// # gwsync-core
//
// Core library for reconciling domain block lists with Gateway lists and rules.
//
// ## Architecture Overview
//
// - **GatewayApi**: Trait for single-shot calls against the Gateway list/rule API
// - **PipelineStatus**: Trait for reading the outcome of previous CI runs
// - **GatewayClient**: Typed client wrapping mutations in rate limiting and retry
// - **CacheStore / ListCache**: Durable, read-through snapshot of remote state
// - **Reconciler**: Computes and applies the mutations that converge remote state
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Transports are separate from policy
// 2. **Explicit Policies**: Retry and rate limiting are objects built once per client
// 3. **Write-Through Cache**: Every applied mutation is persisted before the next one
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Diffs are computed against current state, so reruns are safe

pub mod blocklist;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod expression;
pub mod reconciler;
pub mod retry;
pub mod traits;

// Re-export core types for convenience
pub use cache::{CacheSnapshot, CacheStore, ListCache};
pub use client::GatewayClient;
pub use config::{GatewayConfig, PipelineConfig, ReconcileConfig, SyncConfig};
pub use error::{Error, Result};
pub use reconciler::{ReconcileReport, Reconciler};
pub use retry::{RateLimiter, RetryPolicy};
pub use traits::{GatewayApi, GatewayList, GatewayRule, PipelineStatus};
