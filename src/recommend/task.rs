//! Recommendation tasks and their outcomes

use crate::registry::{RoomId, TicketId};

use super::oracle::RecommendedEstimate;

/// Request for an oracle estimate of one ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationTask {
    pub external_key: String,
    pub description: String,
    pub room_id: RoomId,
    pub ticket_id: TicketId,
    /// Attempts made before this one
    pub retry_count: u32,
}

impl RecommendationTask {
    /// A first attempt
    pub fn new(
        room_id: RoomId,
        ticket_id: TicketId,
        external_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            external_key: external_key.into(),
            description: description.into(),
            room_id,
            ticket_id,
            retry_count: 0,
        }
    }

    /// The same task, one attempt later
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// Result of processing one task attempt
///
/// A task moves `Queued -> Processing` and then to one of these. Only
/// `Requeued` puts it back on the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Estimate published to the room
    Succeeded {
        task: RecommendationTask,
        estimate: RecommendedEstimate,
    },
    /// Oracle failed; a retry was queued
    Requeued { task: RecommendationTask },
    /// Oracle failed on the last allowed attempt
    Dropped {
        task: RecommendationTask,
        reason: String,
    },
    /// Room has recommendations disabled, or its flag could not be read
    Skipped { task: RecommendationTask },
}

impl TaskOutcome {
    pub fn task(&self) -> &RecommendationTask {
        match self {
            TaskOutcome::Succeeded { task, .. }
            | TaskOutcome::Requeued { task }
            | TaskOutcome::Dropped { task, .. }
            | TaskOutcome::Skipped { task } => task,
        }
    }

    /// True unless the task was put back on the queue
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::Requeued { .. })
    }
}
