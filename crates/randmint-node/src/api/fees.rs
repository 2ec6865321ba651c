//! Fee account endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Request to add funds.
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub amount: u64,
}

/// Fee account status.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeesResponse {
    pub balance: u64,
    pub collected: u64,
}

/// Add funds to the fee account.
pub async fn fund(
    State(state): State<AppState>,
    Json(req): Json<FundRequest>,
) -> Result<Json<FeesResponse>, ApiError> {
    if req.amount == 0 {
        return Err(ApiError::bad_request("amount must be greater than zero"));
    }

    let balance = state.workflow.fees().fund(req.amount);
    info!(amount = req.amount, balance, "💰 Fee account funded");

    Ok(Json(FeesResponse {
        balance,
        collected: state.coordinator.fees_collected(),
    }))
}

/// Current fee account status.
pub async fn get_fees(State(state): State<AppState>) -> Json<FeesResponse> {
    Json(FeesResponse {
        balance: state.workflow.fees().balance(),
        collected: state.coordinator.fees_collected(),
    })
}
