//! Topic addressing for subscription routing
//!
//! A topic is a slash-separated list of segments such as `room/5/owner`.
//! The single-segment wildcard `*` may appear on either side of a match, so
//! a subscription bound to `room/5/owner` is reached by the pattern
//! `room/5/*` and a subscription bound to `room/*/owner` would be reached by
//! `room/5/owner`.
//!
//! There is no prefix matching and no multi-level wildcard: two topics only
//! match when they have the same number of segments.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Single-segment wildcard
pub const WILDCARD: &str = "*";

/// Identifier of a room
pub type RoomId = u64;

/// Identifier of a ticket
pub type TicketId = u64;

/// Role a connection holds inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Room creator; sees results but does not receive work items
    Owner,
    /// Participant that submits estimates
    Estimator,
}

impl Role {
    /// Topic segment for this role
    pub fn as_segment(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Estimator => "estimator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_segment())
    }
}

/// Who inside a room should receive a published update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection in the room
    Everyone,
    /// Owner connections only
    Owners,
    /// Estimator connections only
    Estimators,
}

/// Error returned when parsing a topic string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// The input was empty
    Empty,
    /// A segment between two slashes was empty
    EmptySegment(usize),
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::Empty => write!(f, "Topic is empty"),
            TopicError::EmptySegment(index) => write!(f, "Topic segment {} is empty", index),
        }
    }
}

impl std::error::Error for TopicError {}

/// Immutable hierarchical address
///
/// Cheap to clone: segments are shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    segments: Arc<[String]>,
}

impl Topic {
    /// Build a topic from already-validated segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self, TopicError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(TopicError::Empty);
        }
        if let Some(index) = segments.iter().position(|s| s.is_empty()) {
            return Err(TopicError::EmptySegment(index));
        }
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Topic a connection is bound to: `room/<id>/<role>`
    pub fn room(room_id: RoomId, role: Role) -> Self {
        Self::trusted(["room".to_string(), room_id.to_string(), role.to_string()])
    }

    /// Pattern reaching an audience inside a room
    pub fn audience(room_id: RoomId, audience: Audience) -> Self {
        let last = match audience {
            Audience::Everyone => WILDCARD,
            Audience::Owners => Role::Owner.as_segment(),
            Audience::Estimators => Role::Estimator.as_segment(),
        };
        Self::trusted(["room".to_string(), room_id.to_string(), last.to_string()])
    }

    fn trusted<const N: usize>(segments: [String; N]) -> Self {
        Self {
            segments: Vec::from(segments).into(),
        }
    }

    /// Segments of this topic
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check whether the topic has no segments
    ///
    /// Parsing rejects empty topics, so this is false for any built topic.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Room id when this topic has the `room/<id>/..` shape
    pub fn room_id(&self) -> Option<RoomId> {
        match self.segments.as_ref() {
            [head, id, ..] if head == "room" => id.parse().ok(),
            _ => None,
        }
    }

    /// Check whether two topics address each other
    ///
    /// Symmetric and reflexive. Segment counts must be equal; each segment
    /// pair matches when either side is `*` or both are equal.
    pub fn matches(&self, other: &Topic) -> bool {
        if self.segments.len() != other.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == WILDCARD || b == WILDCARD || a == b)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TopicError::Empty);
        }
        Self::from_segments(s.split('/'))
    }
}
