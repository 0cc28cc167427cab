//! Sharded fan-out workers
//!
//! `publish()` resolves the matching connections once and enqueues one
//! [`Delivery`] per connection. A fixed pool of workers performs the
//! writes.
//!
//! Each worker owns one bounded queue and deliveries are routed by
//! connection id, so all payloads for a given connection are written by
//! the same worker in the order they were published. A full queue makes
//! the publisher wait; nothing is dropped.
//!
//! A failed write releases the connection. The delivery is discarded and
//! the publisher never hears about it. Every write runs under a deadline,
//! so a peer that stops reading costs its worker at most that long before
//! it is released like any other failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registry::{Registry, RoomId, Topic};
use crate::session::{Connection, TransportError};

/// Default deadline for one delivery write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// One payload headed for one connection
#[derive(Debug)]
pub struct Delivery {
    /// Target connection
    pub connection: Arc<Connection>,
    /// Rendered payload
    pub payload: Bytes,
    /// Room the payload belongs to, for logging
    pub room_id: Option<RoomId>,
}

/// Sharded fan-out worker pool
pub struct Broadcaster {
    registry: Arc<Registry>,
    shards: Vec<mpsc::Sender<Delivery>>,
    workers: Vec<JoinHandle<()>>,
}

impl Broadcaster {
    /// Start `workers` writers sharing `capacity` queued deliveries
    ///
    /// Each worker gets `ceil(capacity / workers)` slots. Both values are
    /// clamped to at least one. Writes use [`DEFAULT_WRITE_TIMEOUT`].
    pub fn spawn(registry: Arc<Registry>, workers: usize, capacity: usize) -> Self {
        Self::spawn_with_timeout(registry, workers, capacity, DEFAULT_WRITE_TIMEOUT)
    }

    /// Like [`Broadcaster::spawn`], releasing any connection whose write
    /// takes longer than `write_timeout`
    pub fn spawn_with_timeout(
        registry: Arc<Registry>,
        workers: usize,
        capacity: usize,
        write_timeout: Duration,
    ) -> Self {
        let workers = workers.max(1);
        let per_shard = capacity.max(1).div_ceil(workers);

        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(per_shard);
            shards.push(tx);
            handles.push(tokio::spawn(run_worker(
                index,
                Arc::clone(&registry),
                rx,
                write_timeout,
            )));
        }

        tracing::debug!(workers, per_shard, ?write_timeout, "Broadcast workers started");

        Self {
            registry,
            shards,
            workers: handles,
        }
    }

    /// Send `payload` to every connection matching `pattern`
    ///
    /// Returns the number of deliveries enqueued. Waits while the target
    /// queue is full.
    pub async fn publish(&self, pattern: &Topic, payload: Bytes) -> usize {
        let targets = self.registry.matching(pattern).await;
        let room_id = pattern.room_id();
        let mut enqueued = 0;

        for connection in targets {
            let delivery = Delivery {
                connection,
                payload: payload.clone(),
                room_id,
            };
            if self.enqueue(delivery).await {
                enqueued += 1;
            }
        }

        tracing::debug!(topic = %pattern, deliveries = enqueued, "Published");
        enqueued
    }

    /// Enqueue a single delivery on its connection's shard
    pub async fn enqueue(&self, delivery: Delivery) -> bool {
        let shard = self.shard_for(&delivery.connection);
        match self.shards[shard].send(delivery).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(delivery)) => {
                tracing::warn!(
                    connection_id = %delivery.connection.id(),
                    shard,
                    "Broadcast worker gone, delivery discarded"
                );
                false
            }
        }
    }

    fn shard_for(&self, connection: &Connection) -> usize {
        (connection.id().as_u64() % self.shards.len() as u64) as usize
    }

    /// Registry deliveries are resolved against
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.shards.len()
    }

    /// Stop all workers; queued deliveries are dropped
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn run_worker(
    index: usize,
    registry: Arc<Registry>,
    mut rx: mpsc::Receiver<Delivery>,
    write_timeout: Duration,
) {
    while let Some(delivery) = rx.recv().await {
        let Delivery {
            connection,
            payload,
            room_id,
        } = delivery;

        // Dropping the timed-out write frees the connection's writer lock
        let written = tokio::time::timeout(write_timeout, connection.send_payload(payload))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match written {
            Ok(()) => {
                registry.stats().delivery_written();
            }
            Err(TransportError::Closed) => {
                tracing::debug!(connection_id = %connection.id(), "Skipping closed connection");
                registry.unregister(connection.id()).await;
            }
            Err(e) => {
                registry.stats().delivery_failed();
                tracing::warn!(
                    connection_id = %connection.id(),
                    room_id = ?room_id,
                    worker = index,
                    error = %e,
                    "Write failed, dropping connection"
                );
                registry.release(&connection).await;
            }
        }
    }

    tracing::debug!(worker = index, "Broadcast worker stopped");
}
