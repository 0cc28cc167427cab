//! In-memory transport for tests
//!
//! `transport_pair()` returns a [`Transport`] for the code under test and a
//! [`Peer`] playing the remote client: it sees every frame written, can
//! inject inbound frames, and can make writes fail or stall.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use tokio::sync::mpsc;

use super::connection::{Frame, Transport, TransportError};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Switches {
    fail: AtomicBool,
    stall: AtomicBool,
}

/// Remote end of an in-memory transport
pub struct Peer {
    written: mpsc::UnboundedReceiver<Frame>,
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    switches: Arc<Switches>,
}

impl Peer {
    /// Next frame written by the server, or `None` after a short timeout
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::time::timeout(RECV_TIMEOUT, self.written.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame if one is already buffered
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.written.try_recv().ok()
    }

    /// Collect `count` frames, stopping early on timeout
    pub async fn recv_many(&mut self, count: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match self.recv().await {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    /// Make every following write fail with an I/O error
    pub fn fail_writes(&self) {
        self.switches.fail.store(true, Ordering::SeqCst);
    }

    /// Make every following write hang
    pub fn stall_writes(&self) {
        self.switches.stall.store(true, Ordering::SeqCst);
    }

    /// Deliver an inbound frame to the server
    pub fn send(&self, frame: Frame) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Deliver an inbound read error to the server
    pub fn send_error(&self) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))));
        }
    }

    /// End the inbound stream as if the peer went away
    pub fn hang_up(&mut self) {
        self.inbound.take();
    }
}

/// Write half handed to the server
struct PeerSink {
    tx: mpsc::UnboundedSender<Frame>,
    switches: Arc<Switches>,
}

impl Sink<Frame> for PeerSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.switches.stall.load(Ordering::SeqCst) {
            // Never woken: the write hangs until the caller gives up
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        if self.switches.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Build a connected in-memory transport and its peer
pub fn transport_pair() -> (Transport, Peer) {
    let (written_tx, written_rx) = mpsc::unbounded_channel::<Frame>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Frame, TransportError>>();
    let switches = Arc::new(Switches::default());

    let sink = PeerSink {
        tx: written_tx,
        switches: Arc::clone(&switches),
    };

    let stream = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let peer = Peer {
        written: written_rx,
        inbound: Some(inbound_tx),
        switches,
    };

    (Transport::new(sink, stream), peer)
}
