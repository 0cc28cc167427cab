//! Persistence interface
//!
//! The engine never owns ticket or estimate data. It asks an
//! [`EstimateStore`] for freshly computed statistics after the caller's
//! transaction has committed, and hands back oracle recommendations to be
//! saved as system estimates.

use std::fmt;
use std::future::Future;

use crate::estimate::TicketAggregate;
use crate::registry::{RoomId, TicketId};

pub mod memory;

pub use memory::{MemoryStore, NewTicket};

/// Store error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No such room
    RoomNotFound(RoomId),
    /// No such ticket
    TicketNotFound(TicketId),
    /// The backing store failed
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::RoomNotFound(id) => write!(f, "Room not found: {}", id),
            StoreError::TicketNotFound(id) => write!(f, "Ticket not found: {}", id),
            StoreError::Backend(msg) => write!(f, "Store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Estimate persistence consumed by the engine
///
/// Implementations are shared across tasks, so every returned future must
/// be `Send`.
pub trait EstimateStore: Send + Sync + 'static {
    /// Statistics of a ticket over its user-authored estimates
    fn recompute_stats(
        &self,
        room_id: RoomId,
        ticket_id: TicketId,
    ) -> impl Future<Output = Result<TicketAggregate, StoreError>> + Send;

    /// Save an oracle recommendation as the ticket's system estimate
    fn create_system_estimate(
        &self,
        ticket_id: TicketId,
        hours: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether the room opted in to oracle recommendations
    fn room_allows_oracle(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Sum of the medians of the room's closed tickets
    fn room_total_estimate(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Option<f64>, StoreError>> + Send;
}
