//! Oracle callback ingress.

use axum::{extract::State, http::StatusCode, Json};
use randmint_core::RequestId;
use randmint_oracle::{DeliveryOutcome, OracleMessage};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Response to an accepted delivery.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub id: RequestId,
    pub outcome: DeliveryOutcome,
}

/// Accept a randomness delivery from the oracle.
///
/// Duplicates are acknowledged like first deliveries so the oracle stops
/// retrying.
pub async fn deliver(
    State(state): State<AppState>,
    Json(message): Json<OracleMessage>,
) -> Result<(StatusCode, Json<CallbackResponse>), ApiError> {
    let id = match &message {
        OracleMessage::RandomnessDelivered { id, .. } => *id,
        OracleMessage::RandomnessRequested(_) => {
            return Err(ApiError::bad_request("expected a randomness_delivered message"));
        }
    };

    let outcome = state.workflow.deliver_message(message).await?;

    Ok((StatusCode::ACCEPTED, Json(CallbackResponse { id, outcome })))
}
