//! In-process estimate store
//!
//! Holds rooms, tickets and estimates in a single `RwLock`ed map. Used by
//! tests and the demo server in place of a database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::estimate::{Author, Estimate, Ticket, TicketAggregate, UserId};
use crate::registry::{RoomId, TicketId};

use super::{EstimateStore, StoreError};

#[derive(Debug, Default)]
struct RoomRecord {
    allow_oracle: bool,
    hidden: bool,
    participants: HashSet<UserId>,
}

#[derive(Debug)]
struct TicketRecord {
    ticket: Ticket,
    estimates: Vec<Estimate>,
}

#[derive(Debug, Default)]
struct State {
    rooms: HashMap<RoomId, RoomRecord>,
    tickets: HashMap<TicketId, TicketRecord>,
}

/// Fields of a ticket about to be created
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub name: String,
    pub external_key: Option<String>,
    pub description: Option<String>,
}

impl NewTicket {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.external_key = Some(key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Estimate store kept in memory
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
    next_ticket_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_ticket_id: AtomicU64::new(1),
        }
    }

    /// Create a room, or update its oracle flag if it exists
    pub async fn create_room(&self, room_id: RoomId, allow_oracle: bool) {
        let mut state = self.state.write().await;
        state.rooms.entry(room_id).or_default().allow_oracle = allow_oracle;
    }

    /// Add a user to a room's participants
    pub async fn join_room(&self, room_id: RoomId, user_id: UserId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or(StoreError::RoomNotFound(room_id))?;
        room.participants.insert(user_id);
        Ok(())
    }

    /// Create an open ticket
    pub async fn create_ticket(
        &self,
        room_id: RoomId,
        new: NewTicket,
    ) -> Result<Ticket, StoreError> {
        let mut state = self.state.write().await;
        if !state.rooms.contains_key(&room_id) {
            return Err(StoreError::RoomNotFound(room_id));
        }

        let ticket = Ticket {
            id: self.next_ticket_id.fetch_add(1, Ordering::Relaxed),
            room_id,
            name: new.name,
            external_key: new.external_key,
            description: new.description,
            closed: false,
            hidden: false,
        };
        state.tickets.insert(
            ticket.id,
            TicketRecord {
                ticket: ticket.clone(),
                estimates: Vec::new(),
            },
        );
        Ok(ticket)
    }

    /// Record a user's estimate, replacing their previous one
    pub async fn submit_estimate(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        hours: i64,
    ) -> Result<RoomId, StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or(StoreError::TicketNotFound(ticket_id))?;

        record
            .estimates
            .retain(|e| e.author != Author::User(user_id));
        record
            .estimates
            .push(Estimate::by_user(ticket_id, user_id, hours));
        Ok(record.ticket.room_id)
    }

    /// Mark a ticket closed
    pub async fn close_ticket(&self, ticket_id: TicketId) -> Result<Ticket, StoreError> {
        self.update_ticket(ticket_id, |t| t.closed = true).await
    }

    /// Hide or show a ticket
    pub async fn set_ticket_hidden(
        &self,
        ticket_id: TicketId,
        hidden: bool,
    ) -> Result<Ticket, StoreError> {
        self.update_ticket(ticket_id, |t| t.hidden = hidden).await
    }

    /// Hide or show every ticket of a room
    pub async fn set_room_hidden(&self, room_id: RoomId, hidden: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or(StoreError::RoomNotFound(room_id))?;
        room.hidden = hidden;
        Ok(())
    }

    /// Whether a room is hidden
    pub async fn room_hidden(&self, room_id: RoomId) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        state
            .rooms
            .get(&room_id)
            .map(|r| r.hidden)
            .ok_or(StoreError::RoomNotFound(room_id))
    }

    /// Every estimate of a ticket, system ones included
    pub async fn estimates(&self, ticket_id: TicketId) -> Result<Vec<Estimate>, StoreError> {
        let state = self.state.read().await;
        state
            .tickets
            .get(&ticket_id)
            .map(|r| r.estimates.clone())
            .ok_or(StoreError::TicketNotFound(ticket_id))
    }

    async fn update_ticket<F>(&self, ticket_id: TicketId, apply: F) -> Result<Ticket, StoreError>
    where
        F: FnOnce(&mut Ticket),
    {
        let mut state = self.state.write().await;
        let record = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or(StoreError::TicketNotFound(ticket_id))?;
        apply(&mut record.ticket);
        Ok(record.ticket.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn aggregate(&self, ticket_id: TicketId) -> Result<TicketAggregate, StoreError> {
        let record = self
            .tickets
            .get(&ticket_id)
            .ok_or(StoreError::TicketNotFound(ticket_id))?;
        let room_id = record.ticket.room_id;
        let participants = self
            .rooms
            .get(&room_id)
            .map(|r| r.participants.len())
            .unwrap_or(0);

        Ok(TicketAggregate::compute(
            ticket_id,
            room_id,
            record.ticket.external_key.clone(),
            &record.estimates,
            participants,
        ))
    }
}

impl EstimateStore for MemoryStore {
    async fn recompute_stats(
        &self,
        room_id: RoomId,
        ticket_id: TicketId,
    ) -> Result<TicketAggregate, StoreError> {
        let state = self.state.read().await;
        let aggregate = state.aggregate(ticket_id)?;
        if aggregate.room_id != room_id {
            return Err(StoreError::TicketNotFound(ticket_id));
        }
        Ok(aggregate)
    }

    async fn create_system_estimate(&self, ticket_id: TicketId, hours: i64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or(StoreError::TicketNotFound(ticket_id))?;

        record.estimates.retain(|e| e.author != Author::System);
        record.estimates.push(Estimate::by_system(ticket_id, hours));
        Ok(())
    }

    async fn room_allows_oracle(&self, room_id: RoomId) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        state
            .rooms
            .get(&room_id)
            .map(|r| r.allow_oracle)
            .ok_or(StoreError::RoomNotFound(room_id))
    }

    async fn room_total_estimate(&self, room_id: RoomId) -> Result<Option<f64>, StoreError> {
        let state = self.state.read().await;
        if !state.rooms.contains_key(&room_id) {
            return Err(StoreError::RoomNotFound(room_id));
        }

        let mut total = 0.0;
        for record in state.tickets.values() {
            if record.ticket.room_id != room_id || !record.ticket.closed {
                continue;
            }
            if let Some(median) = state.aggregate(record.ticket.id)?.median {
                total += median;
            }
        }
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    async fn room_with_users(store: &MemoryStore, room_id: RoomId, users: &[UserId]) {
        store.create_room(room_id, true).await;
        for user in users {
            assert_ok!(store.join_room(room_id, *user).await);
        }
    }

    #[tokio::test]
    async fn test_recompute_stats() {
        let store = MemoryStore::new();
        room_with_users(&store, 5, &[1, 2, 3]).await;
        let ticket = assert_ok!(store.create_ticket(5, NewTicket::named("Login")).await);

        for (user, hours) in [(1, 8), (2, 16), (3, 24)] {
            assert_ok!(store.submit_estimate(ticket.id, user, hours).await);
        }

        let agg = assert_ok!(store.recompute_stats(5, ticket.id).await);
        assert_eq!(agg.average, Some(16.0));
        assert_eq!(agg.respondents, 3);
        assert_eq!(agg.participants, 3);
    }

    #[tokio::test]
    async fn test_resubmit_replaces() {
        let store = MemoryStore::new();
        room_with_users(&store, 1, &[7]).await;
        let ticket = assert_ok!(store.create_ticket(1, NewTicket::named("a")).await);

        assert_ok!(store.submit_estimate(ticket.id, 7, 8).await);
        assert_ok!(store.submit_estimate(ticket.id, 7, 40).await);

        let agg = assert_ok!(store.recompute_stats(1, ticket.id).await);
        assert_eq!(agg.average, Some(40.0));
        assert_eq!(agg.respondents, 1);
    }

    #[tokio::test]
    async fn test_system_estimate_stored_not_counted() {
        let store = MemoryStore::new();
        room_with_users(&store, 1, &[7]).await;
        let ticket = assert_ok!(store.create_ticket(1, NewTicket::named("a")).await);

        assert_ok!(store.create_system_estimate(ticket.id, 53).await);

        let estimates = assert_ok!(store.estimates(ticket.id).await);
        assert_eq!(estimates, vec![Estimate::by_system(ticket.id, 53)]);
        let agg = assert_ok!(store.recompute_stats(1, ticket.id).await);
        assert_eq!(agg.average, None);
    }

    #[tokio::test]
    async fn test_room_total_sums_closed_medians() {
        let store = MemoryStore::new();
        room_with_users(&store, 2, &[1, 2]).await;
        let first = assert_ok!(store.create_ticket(2, NewTicket::named("a")).await);
        let second = assert_ok!(store.create_ticket(2, NewTicket::named("b")).await);
        let open = assert_ok!(store.create_ticket(2, NewTicket::named("c")).await);

        assert_ok!(store.submit_estimate(first.id, 1, 8).await);
        assert_ok!(store.submit_estimate(first.id, 2, 16).await);
        assert_ok!(store.submit_estimate(second.id, 1, 40).await);
        assert_ok!(store.submit_estimate(open.id, 1, 400).await);

        assert_eq!(store.room_total_estimate(2).await, Ok(Some(0.0)));

        assert_ok!(store.close_ticket(first.id).await);
        assert_ok!(store.close_ticket(second.id).await);
        assert_eq!(store.room_total_estimate(2).await, Ok(Some(52.0)));
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert_eq!(
            store.room_allows_oracle(9).await,
            Err(StoreError::RoomNotFound(9))
        );
        assert_eq!(
            store.create_system_estimate(9, 1).await,
            Err(StoreError::TicketNotFound(9))
        );
        assert!(store.create_ticket(9, NewTicket::named("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_oracle_flag() {
        let store = MemoryStore::new();
        store.create_room(3, false).await;
        assert_eq!(store.room_allows_oracle(3).await, Ok(false));
        store.create_room(3, true).await;
        assert_eq!(store.room_allows_oracle(3).await, Ok(true));
    }
}
