//! Service boundary for the Sentinel risk core.
//!
//! [`RiskService`] is the only component the (external) transport layer
//! talks to; [`FeedHandle`] decouples feed ingestion rate from computation
//! rate with a bounded channel and a worker thread.

pub mod feed;
pub mod service;

pub use feed::{FeedConfig, FeedHandle, FeedStatsSnapshot, OverflowPolicy};
pub use service::{RiskService, RiskServiceConfig};
