//! Subscription registry implementation
//!
//! The single shared map from connection identity to the topic that
//! connection listens on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{Connection, ConnectionId};
use crate::stats::EngineStats;

use super::entry::Subscription;
use super::error::RegistryError;
use super::topic::{RoomId, Topic};

/// Registry of live subscriptions
///
/// Thread-safe via `RwLock`. Publishing only needs the read side, so
/// concurrent fan-outs never wait on each other; registration and removal
/// take the write side.
pub struct Registry {
    /// Map of connection id to its binding
    subscriptions: RwLock<HashMap<ConnectionId, Subscription>>,

    /// Shared counters
    stats: Arc<EngineStats>,
}

impl Registry {
    /// Create an empty registry with its own counters
    pub fn new() -> Self {
        Self::with_stats(Arc::new(EngineStats::new()))
    }

    /// Create an empty registry reporting into shared counters
    pub fn with_stats(stats: Arc<EngineStats>) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            stats,
        }
    }

    /// Counters this registry reports into
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Bind a connection to a topic
    ///
    /// Replaces any previous binding of the same connection and returns the
    /// topic it replaced. A connection that already started closing is
    /// rejected.
    pub async fn register(
        &self,
        connection: Arc<Connection>,
        topic: Topic,
    ) -> Result<Option<Topic>, RegistryError> {
        let mut subscriptions = self.subscriptions.write().await;

        if !connection.mark_registered() {
            return Err(RegistryError::ConnectionClosed(connection.id()));
        }

        let id = connection.id();
        let previous = subscriptions
            .insert(id, Subscription::new(connection, topic.clone()))
            .map(|sub| sub.topic);

        match &previous {
            Some(old) => {
                tracing::info!(
                    connection_id = %id,
                    from = %old,
                    to = %topic,
                    "Connection rebound"
                );
            }
            None => {
                self.stats.connection_registered();
                tracing::info!(
                    connection_id = %id,
                    topic = %topic,
                    connections = subscriptions.len(),
                    "Connection registered"
                );
            }
        }

        Ok(previous)
    }

    /// Remove a connection's binding
    ///
    /// Idempotent; returns the connection if it was still bound.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut subscriptions = self.subscriptions.write().await;
        let removed = subscriptions.remove(&id)?;

        self.stats.connection_removed();
        tracing::info!(
            connection_id = %id,
            topic = %removed.topic,
            connections = subscriptions.len(),
            "Connection unregistered"
        );

        Some(removed.connection)
    }

    /// Remove a connection and close it
    ///
    /// The binding is dropped before the close handshake starts, so no
    /// later `matching()` can return the connection.
    pub async fn release(&self, connection: &Connection) {
        self.unregister(connection.id()).await;
        connection.close().await;
    }

    /// Snapshot of every connection whose topic matches `pattern`
    pub async fn matching(&self, pattern: &Topic) -> Vec<Arc<Connection>> {
        let subscriptions = self.subscriptions.read().await;

        subscriptions
            .values()
            .filter(|sub| sub.matches(pattern))
            .map(|sub| Arc::clone(&sub.connection))
            .collect()
    }

    /// Topic a connection is currently bound to
    pub async fn topic_of(&self, id: ConnectionId) -> Option<Topic> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.get(&id).map(|sub| sub.topic.clone())
    }

    /// Check whether a connection is bound
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.subscriptions.read().await.contains_key(&id)
    }

    /// Number of bound connections
    pub async fn connection_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Number of bound connections in one room
    pub async fn room_connection_count(&self, room_id: RoomId) -> usize {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .values()
            .filter(|sub| sub.topic.room_id() == Some(room_id))
            .count()
    }

    /// Bindings in one room
    pub async fn subscriptions_for_room(&self, room_id: RoomId) -> Vec<Subscription> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .values()
            .filter(|sub| sub.topic.room_id() == Some(room_id))
            .cloned()
            .collect()
    }

    /// Copy of every binding
    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
