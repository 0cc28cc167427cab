//! Connection state machine
//!
//! Tracks a connection from the moment the transport hands it over until it
//! is closed. Transitions only move forward; a closed connection never
//! reopens.

use std::sync::atomic::{AtomicU8, Ordering};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionPhase {
    /// Transport upgraded, not yet bound to a topic
    Open,
    /// Bound to a topic in the registry
    Registered,
    /// Close requested; the write half is being shut down
    Closing,
    /// Closed
    Closed,
}

impl ConnectionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionPhase::Open,
            1 => ConnectionPhase::Registered,
            2 => ConnectionPhase::Closing,
            _ => ConnectionPhase::Closed,
        }
    }
}

/// Lock-free holder for a [`ConnectionPhase`]
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    /// Create a cell in the `Open` phase
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionPhase::Open as u8))
    }

    /// Current phase
    pub fn get(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Mark the connection registered
    ///
    /// Returns false if the connection is already closing or closed.
    pub fn mark_registered(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ConnectionPhase::from_u8(current) {
                    ConnectionPhase::Open | ConnectionPhase::Registered => {
                        Some(ConnectionPhase::Registered as u8)
                    }
                    _ => None,
                }
            })
            .is_ok()
    }

    /// Start closing
    ///
    /// Returns true only for the caller that performed the transition, so
    /// the close sequence runs once.
    pub fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ConnectionPhase::from_u8(current) {
                    ConnectionPhase::Closing | ConnectionPhase::Closed => None,
                    _ => Some(ConnectionPhase::Closing as u8),
                }
            })
            .is_ok()
    }

    /// Mark closed
    pub fn mark_closed(&self) {
        self.0.store(ConnectionPhase::Closed as u8, Ordering::Release);
    }

    /// True once closing has started
    pub fn is_closed(&self) -> bool {
        self.get() >= ConnectionPhase::Closing
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
