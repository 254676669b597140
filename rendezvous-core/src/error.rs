//! Error types for the rendezvous engine.

use thiserror::Error;

use crate::event::{EventId, RequestId, UserId};
use crate::relationship::Relationship;

/// Failure reported by the remote authority, classified from an HTTP-like status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The authority already reflects the intended outcome ("already requested", "already a member").
    #[error("Already in the requested state: {0}")]
    AlreadyInState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication expired")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server unavailable (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Classify a non-success status code and its message body.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::Forbidden(message),
            404 | 410 => RemoteError::NotFound(message),
            409 => RemoteError::AlreadyInState(message),
            400 | 422 if message.to_lowercase().contains("already") => {
                RemoteError::AlreadyInState(message)
            }
            408 | 429 | 500..=599 => RemoteError::Transient { status, message },
            _ => RemoteError::Rejected { status, message },
        }
    }

    pub fn is_benign_race(&self) -> bool {
        matches!(self, RemoteError::AlreadyInState(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient { .. } | RemoteError::Network(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Only the organizer of event '{0}' can do this")]
    NotOrganizer(EventId),

    #[error("Only the invited user can respond to invitation '{0}'")]
    NotTarget(RequestId),

    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("User '{user}' cannot be invited: currently {relationship}")]
    InvalidTarget {
        user: UserId,
        relationship: Relationship,
    },

    #[error("User '{user}' is not a participant of event '{event_id}'")]
    NotParticipant { event_id: EventId, user: UserId },

    #[error("Event '{0}' is full")]
    EventFull(EventId),

    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// The target no longer exists on the authority; the local copy was dropped.
    #[error("No longer available: {0}")]
    Stale(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Mutation task ended before reporting a result")]
    Dropped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Soft notices are shown to the user but are not hard failures.
    pub fn is_soft(&self) -> bool {
        matches!(self, EngineError::Stale(_))
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
