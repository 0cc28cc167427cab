//! Engine statistics

pub mod metrics;

pub use metrics::{EngineStats, EngineStatsSnapshot};
