//! Error taxonomy shared by the event store, pattern store, and prediction engine.
//!
//! "No patterns available" is deliberately absent: an empty prediction is a
//! [`PredictionStatus`](crate::predict::PredictionStatus), not a fault.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input rejected at ingestion. Never persisted.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Transient storage failure or timeout. Callers may retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::StorageUnavailable(format!("lock poisoned: {e}"))
    }
}
