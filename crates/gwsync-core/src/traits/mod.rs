//! Core traits for gwsync
//!
//! This module defines the abstract interfaces to the outside world.
//!
//! - [`GatewayApi`]: Single-shot calls against the Gateway list/rule API
//! - [`PipelineStatus`]: Outcome of previous CI runs, plus housekeeping

pub mod gateway_api;
pub mod pipeline_status;

pub use gateway_api::{GatewayApi, GatewayList, GatewayRule};
pub use pipeline_status::{PipelineCacheEntry, PipelineRun, PipelineStatus, latest_completed};
