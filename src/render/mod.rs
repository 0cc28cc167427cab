//! Outbound events and their rendering
//!
//! The engine decides *who* receives an update; a [`Render`]
//! implementation decides what the bytes look like. Payloads are opaque to
//! everything downstream of rendering.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::estimate::{EstimateSummary, Ticket};
use crate::registry::{RoomId, TicketId};

pub mod json;

pub use json::JsonRenderer;

/// Domain update pushed to room members
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A ticket was added to the room
    TicketCreated { ticket: Ticket },
    /// Several tickets were added at once, newest first
    TicketsImported { room_id: RoomId, tickets: Vec<Ticket> },
    /// Voting on a ticket ended
    TicketClosed { ticket: Ticket, summary: EstimateSummary },
    /// Sum of the medians of the room's closed tickets
    RoomTotal { room_id: RoomId, total: String },
    /// A ticket's visibility changed
    TicketVisibility { ticket_id: TicketId, hidden: bool },
    /// Visibility of every ticket in the room changed
    RoomVisibility { room_id: RoomId, hidden: bool },
    /// A ticket's statistics changed
    EstimateUpdated { summary: EstimateSummary },
    /// The oracle suggested an estimate
    RecommendationAvailable {
        room_id: RoomId,
        ticket_id: TicketId,
        external_key: Option<String>,
        recommendation: String,
    },
}

impl Event {
    /// Short event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TicketCreated { .. } => "ticket_created",
            Event::TicketsImported { .. } => "tickets_imported",
            Event::TicketClosed { .. } => "ticket_closed",
            Event::RoomTotal { .. } => "room_total",
            Event::TicketVisibility { .. } => "ticket_visibility",
            Event::RoomVisibility { .. } => "room_visibility",
            Event::EstimateUpdated { .. } => "estimate_updated",
            Event::RecommendationAvailable { .. } => "recommendation_available",
        }
    }
}

/// Rendering error
#[derive(Debug)]
pub enum RenderError {
    /// Serialization failed
    Serialize(serde_json::Error),
    /// The renderer has no representation for this event
    Unsupported(&'static str),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Serialize(e) => write!(f, "Serialization failed: {}", e),
            RenderError::Unsupported(kind) => write!(f, "Cannot render event: {}", kind),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Serialize(e) => Some(e),
            RenderError::Unsupported(_) => None,
        }
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Serialize(err)
    }
}

/// Turns an event into a wire payload
pub trait Render: Send + Sync + 'static {
    fn render(&self, event: &Event) -> Result<Bytes, RenderError>;
}
