//! Error types for fieldqueue.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the queue, its store, and the surrounding tooling.
#[derive(Debug, Error)]
pub enum QueueError {
    /// An action with this id is already stored.
    #[error("Queued action {0} already exists")]
    DuplicateKey(String),

    /// The store rejected an enqueue (quota, corruption, closed handle).
    #[error("Failed to persist queued action: {0}")]
    Persist(String),

    /// Any other storage failure.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether this error is an id collision.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

/// An indeterminate delivery outcome.
///
/// Returned by a [`Deliver`](crate::queue::Deliver) implementation when it
/// cannot say whether the action reached the backend.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response (DNS, connect, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The delivery did not resolve within the configured timeout.
    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),

    /// The action could not be turned back into a request.
    #[error("Malformed action: {0}")]
    Malformed(String),

    /// The delivery implementation panicked.
    #[error("Delivery panicked: {0}")]
    Panicked(String),
}
