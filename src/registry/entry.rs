//! Subscription entry
//!
//! One binding from a connection to the topic it listens on.

use std::sync::Arc;
use std::time::Instant;

use crate::session::Connection;

use super::topic::Topic;

/// A single connection → topic binding
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Bound connection
    pub connection: Arc<Connection>,

    /// Topic the connection listens on
    pub topic: Topic,

    /// When the current binding was installed
    pub bound_at: Instant,
}

impl Subscription {
    pub(super) fn new(connection: Arc<Connection>, topic: Topic) -> Self {
        Self {
            connection,
            topic,
            bound_at: Instant::now(),
        }
    }

    /// Check whether a publish pattern reaches this subscription
    pub fn matches(&self, pattern: &Topic) -> bool {
        self.topic.matches(pattern)
    }
}
