//! Relay and fallback statistics

pub mod metrics;

pub use metrics::{RelayStats, RelayStatsSnapshot};
