//! Connection sessions
//!
//! A session starts when the transport layer hands over an upgraded
//! full-duplex stream and ends when either side closes it. The write half
//! becomes a shared [`Connection`]; the read half is consumed by the
//! liveness task in [`liveness`].

pub mod connection;
pub mod liveness;
pub mod state;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{Connection, ConnectionId, Frame, FrameSink, FrameStream, Transport, TransportError};
pub use liveness::{spawn_probe_sweep, spawn_read_loop, sweep_once, ReadExit};
pub use state::ConnectionPhase;
pub use websocket::websocket_transport;
