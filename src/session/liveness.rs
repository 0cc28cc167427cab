//! Connection liveness
//!
//! Two mechanisms keep the registry free of dead connections:
//!
//! - a read loop per connection that drains inbound frames under an idle
//!   deadline, and releases the connection on close, error, end of stream
//!   or deadline expiry;
//! - a periodic probe sweep that pings every registered connection and
//!   releases the ones whose probe fails.
//!
//! Neither holds the registry lock while doing I/O.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::registry::Registry;

use super::connection::{Connection, Frame, FrameStream};

/// Why a read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExit {
    /// Peer sent a close frame
    Closed,
    /// Inbound stream ended
    Eof,
    /// Read failed
    Error,
    /// Nothing was read within the idle deadline
    Idle,
    /// Local side closed the connection first
    Released,
}

/// Spawn the read loop for one connection
///
/// Every frame, including pings and pongs, resets the idle deadline.
/// Application data is read and discarded.
pub fn spawn_read_loop(
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    stream: FrameStream,
    idle_timeout: Duration,
) -> JoinHandle<ReadExit> {
    tokio::spawn(read_loop(registry, connection, stream, idle_timeout))
}

async fn read_loop(
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    mut stream: FrameStream,
    idle_timeout: Duration,
) -> ReadExit {
    let exit = loop {
        if connection.is_closed() {
            break ReadExit::Released;
        }

        match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(Frame::Close))) => break ReadExit::Closed,
            Ok(Some(Ok(frame))) => {
                tracing::trace!(connection_id = %connection.id(), ?frame, "Inbound frame");
            }
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Read failed");
                break ReadExit::Error;
            }
            Ok(None) => break ReadExit::Eof,
            Err(_) => {
                registry.stats().idle_timeout();
                tracing::warn!(
                    connection_id = %connection.id(),
                    idle_secs = idle_timeout.as_secs(),
                    "Connection idle, dropping"
                );
                break ReadExit::Idle;
            }
        }
    };

    registry.release(&connection).await;
    tracing::debug!(connection_id = %connection.id(), ?exit, "Read loop finished");
    exit
}

/// Probe every registered connection once
///
/// Returns the number of connections released. Probes run concurrently
/// against a snapshot, so a slow peer only delays its own probe.
pub async fn sweep_once(registry: &Registry, probe_timeout: Duration) -> usize {
    let subscriptions = registry.snapshot().await;
    tracing::debug!(connections = subscriptions.len(), "Probing connections");

    let probes = subscriptions.into_iter().map(|sub| async move {
        match sub.connection.probe(probe_timeout).await {
            Ok(()) => false,
            Err(e) => {
                registry.stats().probe_failed();
                tracing::warn!(
                    connection_id = %sub.connection.id(),
                    topic = %sub.topic,
                    error = %e,
                    "Liveness probe failed"
                );
                registry.release(&sub.connection).await;
                true
            }
        }
    });

    join_all(probes).await.into_iter().filter(|released| *released).count()
}

/// Spawn the periodic probe sweep
///
/// The first sweep runs one full `interval` after spawning.
pub fn spawn_probe_sweep(
    registry: Arc<Registry>,
    interval: Duration,
    probe_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let released = sweep_once(&registry, probe_timeout).await;
            if released > 0 {
                tracing::info!(released, "Probe sweep released connections");
            }
        }
    })
}
