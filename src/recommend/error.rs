//! Recommendation error types

use std::fmt;

/// Oracle call failure
#[derive(Debug)]
pub enum OracleError {
    /// No answer within the deadline
    Timeout,
    /// Request could not be sent or the response not read
    Http(reqwest::Error),
    /// Non-success status
    Status { status: u16, body: String },
    /// Response did not contain an estimate
    Malformed(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Timeout => write!(f, "Oracle timed out"),
            OracleError::Http(e) => write!(f, "Oracle request failed: {}", e),
            OracleError::Status { status, body } => {
                write!(f, "Oracle returned status {}: {}", status, body)
            }
            OracleError::Malformed(msg) => write!(f, "Malformed oracle response: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OracleError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout
        } else {
            OracleError::Http(err)
        }
    }
}

/// Task submission failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendError {
    /// Queue at capacity
    QueueFull,
    /// Workers are gone
    Closed,
}

impl fmt::Display for RecommendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendError::QueueFull => write!(f, "Recommendation queue is full"),
            RecommendError::Closed => write!(f, "Recommendation pipeline is stopped"),
        }
    }
}

impl std::error::Error for RecommendError {}
