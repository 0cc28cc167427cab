//! Subscription registry for pub/sub routing
//!
//! The registry maps every live connection to the one topic it listens on.
//! Publishers resolve a pattern against it once and hand the resulting
//! connections to the broadcaster.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<Registry>
//!                 ┌──────────────────────────┐
//!                 │ subscriptions: HashMap<  │
//!                 │   ConnectionId,          │
//!                 │   Subscription {         │
//!                 │     connection, topic    │
//!                 │   }                      │
//!                 │ >                        │
//!                 └────────────┬─────────────┘
//!                              │
//!        ┌─────────────────────┼──────────────────────┐
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//!   [register]           [matching]             [unregister]
//!   upgrade path      Broadcaster::publish   liveness / write failure
//! ```
//!
//! Topics are `room/<id>/<role>`; publish patterns use `*` for "any role".

pub mod entry;
pub mod error;
pub mod store;
pub mod topic;

pub use entry::Subscription;
pub use error::RegistryError;
pub use store::Registry;
pub use topic::{Audience, Role, RoomId, TicketId, Topic, TopicError};
