//! Real-time synchronization engine for collaborative sprint estimation
//!
//! Room members hold long-lived WebSocket connections. Each connection is
//! bound to a topic `room/<id>/<role>`; updates are published to a pattern
//! such as `room/5/*` and written to every matching connection by a pool
//! of broadcast workers. Dead connections are found by a per-connection
//! read deadline and a periodic ping sweep.
//!
//! New tickets can optionally be sent to an estimation oracle. Its answer
//! is stored as a system estimate and pushed to the room like any other
//! update.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use estimation_sync::{
//!     Admission, EngineConfig, JsonRenderer, MemoryStore, Role, ServerConfig, SyncEngine,
//!     SyncServer, UpgradeHandler, UpgradeRequest,
//! };
//!
//! struct OwnerOfRoomOne;
//!
//! impl UpgradeHandler for OwnerOfRoomOne {
//!     async fn admit(&self, _request: &UpgradeRequest) -> Admission {
//!         Admission::Accept { room_id: 1, role: Role::Owner }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> estimation_sync::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let engine = Arc::new(SyncEngine::new(EngineConfig::default(), store, JsonRenderer));
//!     let server = SyncServer::new(ServerConfig::default(), OwnerOfRoomOne, engine);
//!     server.run().await
//! }
//! ```

pub mod broadcast;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod recommend;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use broadcast::{Broadcaster, EventPublisher};
pub use engine::{EngineConfig, Session, SyncEngine};
pub use error::{Error, Result};
pub use estimate::{Notifier, Ticket, TicketAggregate};
pub use recommend::{HttpOracle, Oracle, OracleConfig, RecommendationTask, TaskOutcome};
pub use registry::{Audience, Registry, Role, RoomId, TicketId, Topic};
pub use render::{Event, JsonRenderer, Render};
pub use server::{Admission, ServerConfig, SyncServer, UpgradeHandler, UpgradeRequest};
pub use session::{Connection, ConnectionId, Frame, Transport};
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use store::{EstimateStore, MemoryStore};
