//! Connection handle
//!
//! A [`Connection`] owns the write half of a full-duplex stream. The read
//! half travels separately as a [`FrameStream`] into the liveness task, so
//! reads never contend with writes.
//!
//! All writes to one connection go through a single async mutex, which
//! keeps a liveness probe from interleaving with a delivery.

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream};
use tokio::sync::Mutex;

use super::state::{ConnectionPhase, PhaseCell};

/// Upper bound for the close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity
///
/// Two connections never share an id, so comparing ids is comparing
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 application payload
    Text(Bytes),
    /// Binary application payload
    Binary(Bytes),
    /// Liveness probe
    Ping(Bytes),
    /// Probe answer
    Pong(Bytes),
    /// Close notification
    Close,
}

impl Frame {
    /// Wrap an application payload, preferring a text frame
    pub fn payload(data: Bytes) -> Self {
        if std::str::from_utf8(&data).is_ok() {
            Frame::Text(data)
        } else {
            Frame::Binary(data)
        }
    }
}

/// Transport error
#[derive(Debug)]
pub enum TransportError {
    /// Peer or local side closed the stream
    Closed,
    /// Operation did not finish in time
    Timeout,
    /// Underlying I/O failure
    Io(std::io::Error),
    /// Framing or handshake violation
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Connection closed"),
            TransportError::Timeout => write!(f, "Operation timed out"),
            TransportError::Io(e) => write!(f, "I/O error: {}", e),
            TransportError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

/// Boxed write half
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Boxed read half
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Both halves of an upgraded stream, as handed over by the transport layer
pub struct Transport {
    /// Write half
    pub sink: FrameSink,
    /// Read half
    pub stream: FrameStream,
    /// Remote address, when known
    pub peer_addr: Option<SocketAddr>,
}

impl Transport {
    /// Box a sink/stream pair
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
            peer_addr: None,
        }
    }

    /// Attach the remote address
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Split into a connection handle and its read half
    pub fn into_connection(self) -> (Connection, FrameStream) {
        let connection = Connection {
            id: ConnectionId::next(),
            peer_addr: self.peer_addr,
            connected_at: Instant::now(),
            phase: PhaseCell::new(),
            writer: Mutex::new(self.sink),
        };
        (connection, self.stream)
    }
}

/// Write half of a live connection
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    connected_at: Instant,
    phase: PhaseCell,
    writer: Mutex<FrameSink>,
}

impl Connection {
    /// Connection identity
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, when known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Time since the transport handed the connection over
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ConnectionPhase {
        self.phase.get()
    }

    /// True once closing has started
    pub fn is_closed(&self) -> bool {
        self.phase.is_closed()
    }

    pub(crate) fn mark_registered(&self) -> bool {
        self.phase.mark_registered()
    }

    /// Write one frame and flush it
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.send(frame).await
    }

    /// Write an application payload
    pub async fn send_payload(&self, payload: Bytes) -> Result<(), TransportError> {
        self.send(Frame::payload(payload)).await
    }

    /// Send a liveness probe, failing if it is not written within `timeout`
    pub async fn probe(&self, timeout: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.send(Frame::Ping(Bytes::new()))).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Close the write half
    ///
    /// Idempotent. Sends a close frame on a best-effort basis; a peer that
    /// stopped reading cannot hold this up for longer than a second.
    pub async fn close(&self) {
        if !self.phase.begin_close() {
            return;
        }

        let shutdown = async {
            let mut writer = self.writer.lock().await;
            let _ = writer.send(Frame::Close).await;
            let _ = writer.close().await;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await.is_err() {
            tracing::debug!(connection_id = %self.id, "Close handshake timed out");
        }

        self.phase.mark_closed();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("phase", &self.phase.get())
            .finish()
    }
}
