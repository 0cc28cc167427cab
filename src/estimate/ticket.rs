//! Ticket and estimate records

use serde::Serialize;

use crate::registry::{RoomId, TicketId};

/// Identifier of a user
pub type UserId = u64;

/// Who submitted an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Author {
    /// A room participant
    User(UserId),
    /// The recommendation oracle
    System,
}

/// One submitted estimate, in hours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Estimate {
    pub ticket_id: TicketId,
    pub author: Author,
    pub hours: i64,
}

impl Estimate {
    pub fn by_user(ticket_id: TicketId, user_id: UserId, hours: i64) -> Self {
        Self {
            ticket_id,
            author: Author::User(user_id),
            hours,
        }
    }

    pub fn by_system(ticket_id: TicketId, hours: i64) -> Self {
        Self {
            ticket_id,
            author: Author::System,
            hours,
        }
    }
}

/// Ticket as shown to room members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: TicketId,
    pub room_id: RoomId,
    pub name: String,
    /// Key in the external tracker, e.g. `PROJ-12`
    pub external_key: Option<String>,
    pub description: Option<String>,
    pub closed: bool,
    pub hidden: bool,
}

impl Ticket {
    /// External key and description, when both are present and non-empty
    pub fn recommendation_input(&self) -> Option<(&str, &str)> {
        let key = self.external_key.as_deref().filter(|k| !k.trim().is_empty())?;
        let description = self.description.as_deref().filter(|d| !d.trim().is_empty())?;
        Some((key, description))
    }
}
