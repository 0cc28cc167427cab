//! Engine wiring
//!
//! [`SyncEngine`] owns one of each moving part: the registry, the
//! broadcast workers, the probe sweep and, when an oracle is supplied, the
//! recommendation workers. Everything else in the process reaches them
//! through the engine.

pub mod config;
pub mod runtime;

pub use config::EngineConfig;
pub use runtime::{Session, SyncEngine};
