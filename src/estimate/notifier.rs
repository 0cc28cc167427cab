//! Room notifications
//!
//! Entry points called after a ticket or estimate change has been
//! committed. Each one fetches whatever derived data it needs from the
//! store, renders an event and publishes it to the right audience.
//!
//! These methods never fail. Store and render errors are logged and the
//! update is skipped; the caller's change already happened.

use std::sync::Arc;

use crate::broadcast::EventPublisher;
use crate::recommend::{RecommendQueue, RecommendationTask};
use crate::registry::{Audience, RoomId, TicketId};
use crate::render::{Event, Render};
use crate::store::EstimateStore;

use super::aggregate::pretty_fractional;
use super::ticket::Ticket;

/// Turns committed room changes into published events
pub struct Notifier<S, R> {
    store: Arc<S>,
    publisher: Arc<EventPublisher<R>>,
    recommendations: Option<RecommendQueue>,
}

impl<S, R> Notifier<S, R>
where
    S: EstimateStore,
    R: Render,
{
    /// Notifier without recommendations when `recommendations` is `None`
    pub fn new(
        store: Arc<S>,
        publisher: Arc<EventPublisher<R>>,
        recommendations: Option<RecommendQueue>,
    ) -> Self {
        Self {
            store,
            publisher,
            recommendations,
        }
    }

    /// An estimate was added or changed: push new statistics to everyone
    pub async fn estimate_changed(&self, room_id: RoomId, ticket_id: TicketId) {
        let aggregate = match self.store.recompute_stats(room_id, ticket_id).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                tracing::error!(room_id, ticket_id, error = %e, "Failed to recompute statistics");
                return;
            }
        };

        let event = Event::EstimateUpdated {
            summary: aggregate.summary(),
        };
        self.publisher
            .publish(room_id, Audience::Everyone, &event)
            .await;
    }

    /// A ticket was created: show it to estimators and queue a recommendation
    pub async fn ticket_created(&self, ticket: &Ticket) {
        let event = Event::TicketCreated {
            ticket: ticket.clone(),
        };
        self.publisher
            .publish(ticket.room_id, Audience::Estimators, &event)
            .await;

        self.request_recommendation(ticket).await;
    }

    /// Several tickets were imported: show them to estimators, newest first
    pub async fn tickets_imported(&self, room_id: RoomId, mut tickets: Vec<Ticket>) {
        if tickets.is_empty() {
            return;
        }
        tickets.sort_by(|a, b| b.id.cmp(&a.id));

        let event = Event::TicketsImported { room_id, tickets };
        self.publisher
            .publish(room_id, Audience::Estimators, &event)
            .await;
    }

    /// Voting on a ticket ended
    ///
    /// Estimators get the closed ticket with its final statistics; then
    /// everyone gets the room's new total.
    pub async fn ticket_closed(&self, ticket: &Ticket) {
        let room_id = ticket.room_id;

        match self.store.recompute_stats(room_id, ticket.id).await {
            Ok(aggregate) => {
                let event = Event::TicketClosed {
                    ticket: ticket.clone(),
                    summary: aggregate.summary(),
                };
                self.publisher
                    .publish(room_id, Audience::Estimators, &event)
                    .await;
            }
            Err(e) => {
                tracing::error!(room_id, ticket_id = ticket.id, error = %e, "Failed to recompute statistics");
                return;
            }
        }

        match self.store.room_total_estimate(room_id).await {
            Ok(total) => {
                let event = Event::RoomTotal {
                    room_id,
                    total: pretty_fractional(total),
                };
                self.publisher
                    .publish(room_id, Audience::Everyone, &event)
                    .await;
            }
            Err(e) => {
                tracing::error!(room_id, error = %e, "Failed to compute room total");
            }
        }
    }

    /// A ticket was hidden or shown
    pub async fn ticket_hidden(&self, room_id: RoomId, ticket_id: TicketId, hidden: bool) {
        let event = Event::TicketVisibility { ticket_id, hidden };
        self.publisher
            .publish(room_id, Audience::Estimators, &event)
            .await;
    }

    /// Every ticket of a room was hidden or shown
    pub async fn room_hidden(&self, room_id: RoomId, hidden: bool) {
        let event = Event::RoomVisibility { room_id, hidden };
        self.publisher
            .publish(room_id, Audience::Everyone, &event)
            .await;
    }

    async fn request_recommendation(&self, ticket: &Ticket) {
        let Some(queue) = &self.recommendations else {
            return;
        };
        let Some((key, description)) = ticket.recommendation_input() else {
            return;
        };

        let task = RecommendationTask::new(ticket.room_id, ticket.id, key, description);
        match queue.submit(task).await {
            Ok(()) => {
                tracing::debug!(ticket_id = ticket.id, external_key = key, "Recommendation queued");
            }
            Err(e) => {
                tracing::warn!(ticket_id = ticket.id, error = %e, "Recommendation not queued");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::registry::{Registry, Role, Topic};
    use crate::render::JsonRenderer;
    use crate::session::test_support::{transport_pair, Peer};
    use crate::session::{Frame, FrameStream};
    use crate::store::memory::{MemoryStore, NewTicket};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Room {
        store: Arc<MemoryStore>,
        registry: Arc<Registry>,
        notifier: Notifier<MemoryStore, JsonRenderer>,
        owner: Peer,
        estimator: Peer,
        _streams: Vec<FrameStream>,
    }

    async fn join(registry: &Registry, role: Role) -> (Peer, FrameStream) {
        let (transport, peer) = transport_pair();
        let (conn, stream) = transport.into_connection();
        registry
            .register(Arc::new(conn), Topic::room(5, role))
            .await
            .unwrap();
        (peer, stream)
    }

    async fn room(recommendations: Option<RecommendQueue>) -> Room {
        let registry = Arc::new(Registry::new());
        let broadcaster = Arc::new(Broadcaster::spawn(Arc::clone(&registry), 4, 16));
        let publisher = Arc::new(EventPublisher::new(Arc::new(JsonRenderer), broadcaster));
        let store = Arc::new(MemoryStore::new());
        store.create_room(5, true).await;
        for user in [1, 2, 3] {
            store.join_room(5, user).await.unwrap();
        }

        let (owner, s1) = join(&registry, Role::Owner).await;
        let (estimator, s2) = join(&registry, Role::Estimator).await;

        Room {
            notifier: Notifier::new(Arc::clone(&store), publisher, recommendations),
            store,
            registry,
            owner,
            estimator,
            _streams: vec![s1, s2],
        }
    }

    async fn next_json(peer: &mut Peer) -> Value {
        match peer.recv().await {
            Some(Frame::Text(payload)) => serde_json::from_slice(&payload).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    async fn quiet(peer: &mut Peer) -> bool {
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.try_recv().is_none()
    }

    #[tokio::test]
    async fn test_estimate_changed_reaches_everyone() {
        let mut room = room(None).await;
        let ticket = room
            .store
            .create_ticket(5, NewTicket::named("Login"))
            .await
            .unwrap();
        room.store.submit_estimate(ticket.id, 1, 24).await.unwrap();

        room.notifier.estimate_changed(5, ticket.id).await;

        for peer in [&mut room.owner, &mut room.estimator] {
            let value = next_json(peer).await;
            assert_eq!(value["type"], "estimate_updated");
            assert_eq!(value["summary"]["average"], "0w 3d 0h");
            assert_eq!(value["summary"]["estimated_by"], "1/3");
        }
    }

    #[tokio::test]
    async fn test_store_error_publishes_nothing() {
        let mut room = room(None).await;
        room.notifier.estimate_changed(5, 999).await;

        assert!(quiet(&mut room.owner).await);
        assert!(quiet(&mut room.estimator).await);
    }

    #[tokio::test]
    async fn test_ticket_created_estimators_only() {
        let mut room = room(None).await;
        let ticket = room
            .store
            .create_ticket(5, NewTicket::named("Search"))
            .await
            .unwrap();

        room.notifier.ticket_created(&ticket).await;

        let value = next_json(&mut room.estimator).await;
        assert_eq!(value["type"], "ticket_created");
        assert_eq!(value["ticket"]["name"], "Search");
        assert!(quiet(&mut room.owner).await);
    }

    #[tokio::test]
    async fn test_ticket_created_queues_recommendation() {
        let (tx, mut rx) = mpsc::channel(4);
        let queue = RecommendQueue::from_sender(tx);
        let room = room(Some(queue)).await;

        let plain = room
            .store
            .create_ticket(5, NewTicket::named("No key"))
            .await
            .unwrap();
        room.notifier.ticket_created(&plain).await;
        assert!(rx.try_recv().is_err());

        let keyed = room
            .store
            .create_ticket(
                5,
                NewTicket::named("Keyed").with_key("PROJ-4").with_description("Add filters"),
            )
            .await
            .unwrap();
        room.notifier.ticket_created(&keyed).await;

        let task = rx.try_recv().unwrap();
        assert_eq!(task, RecommendationTask::new(5, keyed.id, "PROJ-4", "Add filters"));
    }

    #[tokio::test]
    async fn test_tickets_imported_newest_first() {
        let mut room = room(None).await;
        let mut tickets = Vec::new();
        for name in ["a", "b", "c"] {
            tickets.push(room.store.create_ticket(5, NewTicket::named(name)).await.unwrap());
        }

        room.notifier.tickets_imported(5, tickets).await;

        let value = next_json(&mut room.estimator).await;
        assert_eq!(value["type"], "tickets_imported");
        let names: Vec<&str> = value["tickets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert!(quiet(&mut room.owner).await);
    }

    #[tokio::test]
    async fn test_ticket_closed_then_room_total() {
        let mut room = room(None).await;
        let ticket = room
            .store
            .create_ticket(5, NewTicket::named("Close me"))
            .await
            .unwrap();
        room.store.submit_estimate(ticket.id, 1, 8).await.unwrap();
        room.store.submit_estimate(ticket.id, 2, 24).await.unwrap();
        let closed = room.store.close_ticket(ticket.id).await.unwrap();

        room.notifier.ticket_closed(&closed).await;

        let first = next_json(&mut room.estimator).await;
        assert_eq!(first["type"], "ticket_closed");
        assert_eq!(first["summary"]["median"], "0w 2d 0h");
        assert_eq!(first["ticket"]["closed"], true);

        let second = next_json(&mut room.estimator).await;
        assert_eq!(second["type"], "room_total");
        assert_eq!(second["total"], "0w 2d 0h");

        let owner = next_json(&mut room.owner).await;
        assert_eq!(owner["type"], "room_total");
        assert!(quiet(&mut room.owner).await);
    }

    #[tokio::test]
    async fn test_visibility_audiences() {
        let mut room = room(None).await;

        room.notifier.ticket_hidden(5, 3, true).await;
        let value = next_json(&mut room.estimator).await;
        assert_eq!(value["type"], "ticket_visibility");
        assert!(quiet(&mut room.owner).await);

        room.notifier.room_hidden(5, true).await;
        assert_eq!(next_json(&mut room.estimator).await["type"], "room_visibility");
        assert_eq!(next_json(&mut room.owner).await["type"], "room_visibility");
        assert_eq!(room.registry.connection_count().await, 2);
    }
}
