//! Mapping of workflow errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use randmint_core::{ErrorClass, RandmintError, RequestId, RequestState};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error returned by API handlers.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: ErrorDetails,
}

/// Structured fields of the error, so clients can rebuild it.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RequestState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&RandmintError> for ErrorDetails {
    fn from(err: &RandmintError) -> Self {
        match err {
            RandmintError::NotFound { id }
            | RandmintError::UnknownRequest { id }
            | RandmintError::MissingRandomness { id } => Self {
                id: Some(*id),
                ..Self::default()
            },
            RandmintError::NotReady { id, state }
            | RandmintError::AlreadyTransitioned { id, current: state }
            | RandmintError::InvalidTransition { id, from: state, .. } => Self {
                id: Some(*id),
                state: Some(*state),
                ..Self::default()
            },
            RandmintError::RequestFailed { id, reason } => Self {
                id: Some(*id),
                state: Some(RequestState::Failed),
                reason: Some(reason.clone()),
                ..Self::default()
            },
            RandmintError::SubjectBusy { subject, active } => Self {
                subject: Some(subject.clone()),
                active: Some(*active),
                ..Self::default()
            },
            RandmintError::InvalidSubject { subject, .. } => Self {
                subject: Some(subject.clone()),
                ..Self::default()
            },
            RandmintError::InsufficientFunds { required, available } => Self {
                required: Some(*required),
                available: Some(*available),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub details: ErrorDetails,
}

impl From<RandmintError> for ApiError {
    fn from(err: RandmintError) -> Self {
        let (status, code) = match &err {
            RandmintError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            RandmintError::UnknownRequest { .. } => (StatusCode::NOT_FOUND, "unknown_request"),
            RandmintError::NotReady { .. } => (StatusCode::CONFLICT, "not_ready"),
            RandmintError::AlreadyTransitioned { .. } => (StatusCode::CONFLICT, "already_transitioned"),
            RandmintError::RequestFailed { .. } => (StatusCode::CONFLICT, "request_failed"),
            RandmintError::SubjectBusy { .. } => (StatusCode::CONFLICT, "subject_busy"),
            RandmintError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "insufficient_funds"),
            RandmintError::InvalidSubject { .. }
            | RandmintError::InvalidParams { .. }
            | RandmintError::SerializationError(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            RandmintError::SubmissionRejected { .. } | RandmintError::Transport(_) => {
                (StatusCode::BAD_GATEWAY, "oracle_unavailable")
            }
            RandmintError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RandmintError::InvalidTransition { .. }
            | RandmintError::MissingRandomness { .. }
            | RandmintError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if err.class() == ErrorClass::InvariantViolation {
            error!(error = %err, "Request hit an invariant violation");
        }

        Self {
            status,
            code,
            message: err.to_string(),
            details: ErrorDetails::from(&err),
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
            details: ErrorDetails::default(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}
