//! Randomness request endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use randmint_core::{
    Artifact, KeyHash, RequestId, RequestRecord, RequestState, StrategyParams, SubjectId,
};
use randmint_ledger::RequestLedger;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Request to start a workflow.
///
/// Every field is optional (`{}` is valid): without a subject the next sequential token is
/// used, and missing parameters fall back to the network preset.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    /// The entity the randomness is for.
    pub subject: Option<String>,

    /// Fee override.
    pub fee: Option<u64>,

    /// Key hash override.
    pub key_hash: Option<String>,
}

/// Response after starting a workflow.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: RequestId,
    pub state: RequestState,
}

/// Filter for listing requests.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub state: Option<RequestState>,
}

/// Start a workflow.
pub async fn create_request(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<(StatusCode, Json<CreateResponse>), ApiError> {
    let mut params: StrategyParams = state.config.default_params.clone();
    if let Some(fee) = req.fee {
        params.fee = fee;
    }
    if let Some(key_hash) = req.key_hash {
        params.key_hash = KeyHash::parse(key_hash)?;
    }

    let workflow = &state.workflow;
    let id = match req.subject {
        Some(subject) => {
            let subject = SubjectId::parse(subject)?;
            workflow.start_workflow(subject, params).await?
        }
        None => workflow.start_next(params).await?,
    };

    let current = workflow.poll_status(id).await?;
    info!(request_id = %id, state = %current, "📨 Workflow started");

    Ok((StatusCode::CREATED, Json(CreateResponse { id, state: current })))
}

/// List requests, optionally filtered by state.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestRecord>>, ApiError> {
    let ledger = state.workflow.ledger();
    let records = match query.state {
        Some(filter) => ledger.list_in_state(filter).await?,
        None => ledger.list().await?,
    };
    Ok(Json(records))
}

/// Get a request by ID.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<RequestRecord>, ApiError> {
    Ok(Json(state.workflow.record(id).await?))
}

/// Complete a request and return its artifact.
pub async fn finalize_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<Artifact>, ApiError> {
    Ok(Json(state.workflow.finalize(id).await?))
}

/// Cancel a request still waiting on the oracle.
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<StatusCode, ApiError> {
    state.workflow.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
