//! Crate-boundary error type for domain operations
//!
//! Component-local errors (`EventStoreError`, `SnapshotError`,
//! `RepositoryError`, `EventBusError`, `CheckpointError`) carry the detail
//! specific to their component; `DomainError` is what crosses the boundary
//! back to a command handler or projector runner, following the same
//! funnel-and-convert pattern the teacher crate uses between its storage
//! errors and `RepositoryError`.

use thiserror::Error;

/// Errors surfaced by the event-sourced aggregate store
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Aggregate has no events and no snapshot
    #[error("aggregate not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed; caller should reload and retry
    #[error("version conflict for aggregate {aggregate_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Aggregate whose version check failed
        aggregate_id: String,
        /// Version the caller expected
        expected: u64,
        /// Version actually recorded in the store
        actual: u64,
    },

    /// Event batch has non-contiguous or non-matching aggregate ids
    #[error("invalid event batch: {0}")]
    InvalidBatch(String),

    /// Underlying persistence failure; caller may retry after backoff
    #[error("storage error: {0}")]
    Storage(String),

    /// Bus publish failed after commit; the command's durable effect is
    /// preserved, recovery relies on projector checkpoints
    #[error("event bus unavailable: {0}")]
    BusUnavailable(String),

    /// A projector permanently rejected an event; isolated to the
    /// dead-letter sink and surfaced to the operator
    #[error("projector {projector_id} poisoned by event {event_id}: {reason}")]
    ProjectorPoisonMessage {
        /// Projector that rejected the event
        projector_id: String,
        /// Event that could not be applied
        event_id: String,
        /// Reason the handler gave for the permanent rejection
        reason: String,
    },

    /// A domain invariant was violated by a command
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A command failed input validation before any event was raised
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Failed to serialize or deserialize a payload or snapshot blob
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_))
    }

    /// Check if this is a version conflict, the one caller-retryable error
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DomainError::VersionConflict { .. })
    }

    /// Check if this is a validation-shaped error (rejected before any I/O)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_) | DomainError::InvariantViolation(_)
        )
    }

    /// Maps to the HTTP status code the out-of-scope edge layer would use.
    /// Exposed so callers embedding this crate behind an HTTP surface don't
    /// have to re-derive the mapping described in the design notes.
    pub fn http_status_hint(&self) -> u16 {
        match self {
            DomainError::NotFound(_) => 404,
            DomainError::VersionConflict { .. } => 409,
            DomainError::InvalidBatch(_) | DomainError::ValidationError(_) => 400,
            DomainError::Storage(_) | DomainError::BusUnavailable(_) => 500,
            DomainError::ProjectorPoisonMessage { .. } => 500,
            DomainError::InvariantViolation(_) => 422,
            DomainError::SerializationError(_) => 500,
        }
    }
}
