//! Error taxonomy for the update workflow.
//!
//! Only [`UpdateError::TransientStore`] consumes retry attempts; every other
//! variant short-circuits. Per-instance failures are folded into the terminal
//! [`WorkflowResult`](crate::saga::WorkflowResult) rather than aborting
//! sibling instances.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// Study or instance data absent. Terminal, non-retryable.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network/throttling-shaped store failure. Retried per policy.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// Index compare-and-swap lost a race against another writer.
    #[error("index version for {instance} changed concurrently (expected {expected}, found {actual})")]
    ConcurrentModification {
        instance: String,
        expected: String,
        actual: String,
    },

    /// The index has no current version for an instance that was planned;
    /// it was presumably deleted while the workflow was in flight.
    #[error("index has no current version for {0}")]
    StaleIndex(String),

    /// Best-effort deletion of a superseded version failed. Logged and
    /// recorded, never escalated to a workflow failure.
    #[error("cleanup of {instance}@{version} failed: {message}")]
    Cleanup {
        instance: String,
        version: String,
        message: String,
    },

    /// The durable checkpoint could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl UpdateError {
    /// Whether the retry helper should spend an attempt on this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, UpdateError::TransientStore(_))
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        UpdateError::Serialization(err.to_string())
    }
}
