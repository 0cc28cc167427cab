//! Oracle-backed estimate recommendations
//!
//! When a ticket with a tracker key and a description is created, a
//! [`RecommendationTask`] is queued. Workers ask the [`Oracle`] for an
//! estimate, save it as a system estimate and publish it to the room.
//! Failed attempts are retried a bounded number of times.

pub mod error;
pub mod oracle;
pub mod pipeline;
pub mod task;

pub use error::{OracleError, RecommendError};
pub use oracle::{HttpOracle, Oracle, OracleConfig, RecommendedEstimate};
pub use pipeline::{PipelineConfig, RecommendQueue, RecommendationPipeline};
pub use task::{RecommendationTask, TaskOutcome};
