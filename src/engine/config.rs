//! Engine configuration

use std::time::Duration;

use crate::recommend::PipelineConfig;

/// Engine tuning options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Broadcast writer tasks
    pub broadcast_workers: usize,

    /// Deliveries queued across all writers
    pub broadcast_capacity: usize,

    /// Deadline for one delivery write
    pub write_timeout: Duration,

    /// Drop a connection after this long without inbound frames
    pub idle_timeout: Duration,

    /// Time between liveness probe sweeps
    pub probe_interval: Duration,

    /// Time a single probe may take
    pub probe_timeout: Duration,

    /// Recommendation worker tasks
    pub recommend_workers: usize,

    /// Recommendation tasks queued
    pub recommend_capacity: usize,

    /// Hard limit for one oracle call
    pub oracle_timeout: Duration,

    /// Oracle retries after the first attempt
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broadcast_workers: 30,
            broadcast_capacity: 100,
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            probe_interval: Duration::from_secs(5 * 60),
            probe_timeout: Duration::from_secs(10),
            recommend_workers: 10,
            recommend_capacity: 100,
            oracle_timeout: Duration::from_secs(4),
            max_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Set broadcast worker count and total queue capacity
    pub fn broadcast(mut self, workers: usize, capacity: usize) -> Self {
        self.broadcast_workers = workers;
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the delivery write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the read idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the probe sweep interval and per-probe timeout
    pub fn probe(mut self, interval: Duration, timeout: Duration) -> Self {
        self.probe_interval = interval;
        self.probe_timeout = timeout;
        self
    }

    /// Set recommendation worker count and queue capacity
    pub fn recommend(mut self, workers: usize, capacity: usize) -> Self {
        self.recommend_workers = workers;
        self.recommend_capacity = capacity;
        self
    }

    /// Set the oracle call timeout
    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Set the number of oracle retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Settings for the recommendation worker pool
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.recommend_workers,
            capacity: self.recommend_capacity,
            oracle_timeout: self.oracle_timeout,
            max_retries: self.max_retries,
        }
    }
}
