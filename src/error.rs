//! Crate error type
//!
//! Every module owns a small error enum; this one wraps them so callers
//! crossing module boundaries can use `?` throughout.

use std::fmt;

use crate::recommend::{OracleError, RecommendError};
use crate::registry::{RegistryError, TopicError};
use crate::render::RenderError;
use crate::session::TransportError;
use crate::store::StoreError;

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by this crate
#[derive(Debug)]
pub enum Error {
    /// Socket-level failure
    Io(std::io::Error),
    /// Connection transport failure
    Transport(TransportError),
    /// Registry rejected an operation
    Registry(RegistryError),
    /// Topic could not be parsed
    Topic(TopicError),
    /// Store failure
    Store(StoreError),
    /// Event could not be rendered
    Render(RenderError),
    /// Oracle call failed
    Oracle(OracleError),
    /// Recommendation could not be queued
    Recommend(RecommendError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Topic(e) => write!(f, "Topic error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Render(e) => write!(f, "Render error: {}", e),
            Error::Oracle(e) => write!(f, "Oracle error: {}", e),
            Error::Recommend(e) => write!(f, "Recommendation error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Topic(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Render(e) => Some(e),
            Error::Oracle(e) => Some(e),
            Error::Recommend(e) => Some(e),
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

impl_from! {
    std::io::Error => Io,
    TransportError => Transport,
    RegistryError => Registry,
    TopicError => Topic,
    StoreError => Store,
    RenderError => Render,
    OracleError => Oracle,
    RecommendError => Recommend,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_from_and_display() {
        let err: Error = StoreError::RoomNotFound(4).into();
        assert_eq!(err.to_string(), "Store error: Room not found: 4");
        assert!(err.source().is_some());

        let err: Error = "a//b".parse::<crate::registry::Topic>().unwrap_err().into();
        assert!(matches!(err, Error::Topic(TopicError::EmptySegment(1))));
    }

    #[test]
    fn test_io_error_converts() {
        fn bind() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"))?;
            Ok(())
        }
        assert!(matches!(bind(), Err(Error::Io(_))));
    }
}
