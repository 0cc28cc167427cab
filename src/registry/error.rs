//! Registry error types
//!
//! Error types for subscription registry operations.

use crate::session::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Connection already started closing and cannot be bound
    ConnectionClosed(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ConnectionClosed(id) => {
                write!(f, "Connection {} is closed", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
