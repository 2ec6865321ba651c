//! Error types for randmint.

use thiserror::Error;

use crate::types::{RequestId, RequestState};

/// How a caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Surfaced immediately, never retried.
    Fatal,
    /// Safe to retry with backoff.
    Transient,
    /// Normal asynchronous operation; a control-flow signal, not a failure.
    Benign,
    /// A logic bug. Report loudly.
    InvariantViolation,
}

/// Main error type for randmint operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RandmintError {
    /// The fee account cannot cover the request fee.
    #[error("Insufficient funds: fee {required}, balance {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// Subject identifier failed validation.
    #[error("Invalid subject '{subject}': {message}")]
    InvalidSubject { subject: String, message: String },

    /// Strategy parameters failed validation.
    #[error("Invalid strategy parameters: {message}")]
    InvalidParams { message: String },

    /// Another request for the same subject is still in flight.
    #[error("Subject {subject} already has active request {active}")]
    SubjectBusy { subject: String, active: RequestId },

    /// The oracle transport refused or failed to acknowledge a submission.
    #[error("Oracle submission rejected: {message}")]
    SubmissionRejected { message: String },

    /// Transport-level failure while talking to an external collaborator.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timed out.
    #[error("Operation timed out after {duration_ms}ms: {message}")]
    Timeout { duration_ms: u64, message: String },

    /// Delivery for a request that does not exist or is not awaiting randomness.
    #[error("Unknown request {id}")]
    UnknownRequest { id: RequestId },

    /// Completion attempted before randomness arrived.
    #[error("Request {id} is not ready (state {state})")]
    NotReady { id: RequestId, state: RequestState },

    /// Lost a race: another writer already moved the record.
    #[error("Request {id} already transitioned (now {current})")]
    AlreadyTransitioned { id: RequestId, current: RequestState },

    /// Requested move is not legal from the current state.
    #[error("Invalid transition for request {id}: {from} -> {to}")]
    InvalidTransition {
        id: RequestId,
        from: RequestState,
        to: RequestState,
    },

    /// Completion reached a record without randomness.
    #[error("Request {id} has no randomness recorded")]
    MissingRandomness { id: RequestId },

    /// The request ended in `Failed`.
    #[error("Request {id} failed: {reason}")]
    RequestFailed { id: RequestId, reason: String },

    /// Resource not found.
    #[error("Request {id} not found")]
    NotFound { id: RequestId },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RandmintError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            RandmintError::InsufficientFunds { .. }
            | RandmintError::InvalidSubject { .. }
            | RandmintError::InvalidParams { .. }
            | RandmintError::SubjectBusy { .. }
            | RandmintError::RequestFailed { .. }
            | RandmintError::NotFound { .. }
            | RandmintError::SerializationError(_) => ErrorClass::Fatal,
            RandmintError::SubmissionRejected { .. }
            | RandmintError::Transport(_)
            | RandmintError::Timeout { .. } => ErrorClass::Transient,
            RandmintError::UnknownRequest { .. }
            | RandmintError::NotReady { .. }
            | RandmintError::AlreadyTransitioned { .. } => ErrorClass::Benign,
            RandmintError::InvalidTransition { .. }
            | RandmintError::MissingRandomness { .. }
            | RandmintError::Internal(_) => ErrorClass::InvariantViolation,
        }
    }

    /// Returns true if the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns true if this is an expected signal rather than a failure.
    pub fn is_benign(&self) -> bool {
        self.class() == ErrorClass::Benign
    }

    /// Returns true if this indicates a logic bug.
    pub fn is_invariant_violation(&self) -> bool {
        self.class() == ErrorClass::InvariantViolation
    }

    /// Returns the request ID if available.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            RandmintError::SubjectBusy { active, .. } => Some(*active),
            RandmintError::UnknownRequest { id }
            | RandmintError::NotReady { id, .. }
            | RandmintError::AlreadyTransitioned { id, .. }
            | RandmintError::InvalidTransition { id, .. }
            | RandmintError::MissingRandomness { id }
            | RandmintError::RequestFailed { id, .. }
            | RandmintError::NotFound { id } => Some(*id),
            _ => None,
        }
    }
}

/// Convenience Result type for randmint operations.
pub type Result<T> = std::result::Result<T, RandmintError>;

impl From<serde_json::Error> for RandmintError {
    fn from(err: serde_json::Error) -> Self {
        RandmintError::SerializationError(err.to_string())
    }
}
