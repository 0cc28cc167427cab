//! Counters for the synchronization engine
//!
//! Every component holds the same `Arc<EngineStats>` and bumps relaxed
//! atomics; `snapshot()` copies them into a plain struct for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live engine counters
#[derive(Debug)]
pub struct EngineStats {
    started_at: Instant,
    connections_registered: AtomicU64,
    connections_removed: AtomicU64,
    deliveries_written: AtomicU64,
    deliveries_failed: AtomicU64,
    publishes_abandoned: AtomicU64,
    idle_timeouts: AtomicU64,
    probes_failed: AtomicU64,
    recommendations_succeeded: AtomicU64,
    recommendations_requeued: AtomicU64,
    recommendations_dropped: AtomicU64,
    recommendations_skipped: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Connections bound for the first time
    pub connections_registered: u64,
    /// Connections removed from the registry
    pub connections_removed: u64,
    /// Payloads written to a connection
    pub deliveries_written: u64,
    /// Payload writes that failed
    pub deliveries_failed: u64,
    /// Publishes dropped before fan-out (render failure)
    pub publishes_abandoned: u64,
    /// Connections dropped for read inactivity
    pub idle_timeouts: u64,
    /// Liveness probes that failed
    pub probes_failed: u64,
    /// Oracle recommendations published
    pub recommendations_succeeded: u64,
    /// Oracle tasks put back on the queue
    pub recommendations_requeued: u64,
    /// Oracle tasks given up after the last retry
    pub recommendations_dropped: u64,
    /// Oracle tasks skipped because the room disabled them
    pub recommendations_skipped: u64,
    /// Time since the counters were created
    pub uptime: Duration,
}

impl EngineStatsSnapshot {
    /// Connections currently bound
    pub fn active_connections(&self) -> u64 {
        self.connections_registered
            .saturating_sub(self.connections_removed)
    }
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Increment `", stringify!($field), "`")]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl EngineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_registered: AtomicU64::new(0),
            connections_removed: AtomicU64::new(0),
            deliveries_written: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            publishes_abandoned: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            probes_failed: AtomicU64::new(0),
            recommendations_succeeded: AtomicU64::new(0),
            recommendations_requeued: AtomicU64::new(0),
            recommendations_dropped: AtomicU64::new(0),
            recommendations_skipped: AtomicU64::new(0),
        }
    }

    counter! {
        connection_registered => connections_registered,
        connection_removed => connections_removed,
        delivery_written => deliveries_written,
        delivery_failed => deliveries_failed,
        publish_abandoned => publishes_abandoned,
        idle_timeout => idle_timeouts,
        probe_failed => probes_failed,
        recommendation_succeeded => recommendations_succeeded,
        recommendation_requeued => recommendations_requeued,
        recommendation_dropped => recommendations_dropped,
        recommendation_skipped => recommendations_skipped,
    }

    /// Copy the current values
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            connections_registered: self.connections_registered.load(Ordering::Relaxed),
            connections_removed: self.connections_removed.load(Ordering::Relaxed),
            deliveries_written: self.deliveries_written.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            publishes_abandoned: self.publishes_abandoned.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            recommendations_succeeded: self.recommendations_succeeded.load(Ordering::Relaxed),
            recommendations_requeued: self.recommendations_requeued.load(Ordering::Relaxed),
            recommendations_dropped: self.recommendations_dropped.load(Ordering::Relaxed),
            recommendations_skipped: self.recommendations_skipped.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}
