//! Randmint client implementation.

use std::time::Duration;

use randmint_core::{
    Artifact, BackoffPolicy, Randomness, RandmintError, RequestId, RequestRecord, RequestState,
    Result, StrategyParams, SubjectId,
};
use randmint_oracle::{DeliveryOutcome, OracleMessage};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Client for interacting with a randmint node.
#[derive(Clone)]
pub struct RandmintClient {
    /// Base URL of the node.
    base_url: String,

    /// HTTP client.
    http_client: reqwest::Client,
}

/// Result of asking the node to finalize a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Finalize {
    /// The request completed.
    Ready(Artifact),

    /// Randomness has not arrived yet.
    NotReady,
}

impl Finalize {
    pub fn into_artifact(self) -> Option<Artifact> {
        match self {
            Finalize::Ready(artifact) => Some(artifact),
            Finalize::NotReady => None,
        }
    }
}

/// Request body for starting a workflow.
#[derive(Debug, Default, Serialize)]
struct CreateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_hash: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: RequestId,
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    outcome: DeliveryOutcome,
}

#[derive(Debug, Deserialize)]
struct FeesResponse {
    balance: u64,
}

/// Error body returned by the node.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
    id: Option<RequestId>,
    state: Option<RequestState>,
    subject: Option<String>,
    active: Option<RequestId>,
    required: Option<u64>,
    available: Option<u64>,
    reason: Option<String>,
}

impl RandmintClient {
    /// Connect to a randmint node.
    pub async fn connect(url: &str) -> Result<Self> {
        let base_url = url.trim_end_matches('/').to_string();
        let http_client = reqwest::Client::new();

        // Verify connection with health check
        let health_url = format!("{}/health", base_url);
        http_client
            .get(&health_url)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Request randomness for `subject` with explicit parameters.
    pub async fn start_workflow(
        &self,
        subject: &SubjectId,
        params: &StrategyParams,
    ) -> Result<RequestId> {
        self.create(CreateRequest {
            subject: Some(subject.as_str()),
            fee: Some(params.fee),
            key_hash: Some(params.key_hash.as_str()),
        })
        .await
    }

    /// Request randomness for the node's next sequential token with its
    /// default parameters.
    pub async fn start_next(&self) -> Result<RequestId> {
        self.create(CreateRequest::default()).await
    }

    async fn create(&self, body: CreateRequest<'_>) -> Result<RequestId> {
        let url = format!("{}/api/v1/requests", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response, None).await);
        }

        let created: CreateResponse = response.json().await.map_err(serialization)?;
        Ok(created.id)
    }

    /// Get the full record of a request.
    pub async fn get_request(&self, id: RequestId) -> Result<RequestRecord> {
        let url = format!("{}/api/v1/requests/{}", self.base_url, id);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response, Some(id)).await);
        }

        response.json().await.map_err(serialization)
    }

    /// Current state of a request.
    pub async fn poll_status(&self, id: RequestId) -> Result<RequestState> {
        Ok(self.get_request(id).await?.state)
    }

    /// Ask the node to complete a request.
    pub async fn finalize(&self, id: RequestId) -> Result<Finalize> {
        let url = format!("{}/api/v1/requests/{}/finalize", self.base_url, id);

        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            let artifact = response.json().await.map_err(serialization)?;
            return Ok(Finalize::Ready(artifact));
        }

        match error_from(response, Some(id)).await {
            RandmintError::NotReady { .. } => Ok(Finalize::NotReady),
            e => Err(e),
        }
    }

    /// Deliver randomness for a request, as the oracle would.
    pub async fn deliver(&self, id: RequestId, randomness: Randomness) -> Result<DeliveryOutcome> {
        let url = format!("{}/api/v1/callback", self.base_url);
        let message = OracleMessage::RandomnessDelivered { id, randomness };

        let response = self
            .http_client
            .post(&url)
            .json(&message)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response, Some(id)).await);
        }

        let body: CallbackResponse = response.json().await.map_err(serialization)?;
        Ok(body.outcome)
    }

    /// Cancel a request still waiting on the oracle.
    pub async fn cancel(&self, id: RequestId) -> Result<()> {
        let url = format!("{}/api/v1/requests/{}", self.base_url, id);

        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response, Some(id)).await);
        }

        Ok(())
    }

    /// Add funds to the node's fee account. Returns the new balance.
    pub async fn fund(&self, amount: u64) -> Result<u64> {
        let url = format!("{}/api/v1/fees", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "amount": amount }))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response, None).await);
        }

        let fees: FeesResponse = response.json().await.map_err(serialization)?;
        Ok(fees.balance)
    }

    /// Poll `finalize` with backoff until the artifact is ready or the
    /// policy's wait budget runs out.
    pub async fn wait_for_artifact(&self, id: RequestId, policy: &BackoffPolicy) -> Result<Artifact> {
        let started = Instant::now();
        let deadline = started + policy.max_wait();
        let mut backoff = policy.start();

        loop {
            match self.finalize(id).await {
                Ok(Finalize::Ready(artifact)) => return Ok(artifact),
                Ok(Finalize::NotReady) => {}
                Err(e) if e.is_retryable() => {
                    debug!(request_id = %id, error = %e, "Transient error while waiting");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RandmintError::Timeout {
                    duration_ms: (now - started).as_millis() as u64,
                    message: format!("artifact for request {} not ready", id),
                });
            }

            let delay: Duration = backoff.next_delay().min(deadline - now);
            debug!(request_id = %id, delay_ms = delay.as_millis() as u64, "Artifact not ready");
            tokio::time::sleep(delay).await;
        }
    }
}

fn transport(e: reqwest::Error) -> RandmintError {
    RandmintError::Transport(e.to_string())
}

fn serialization(e: reqwest::Error) -> RandmintError {
    RandmintError::SerializationError(e.to_string())
}

async fn error_from(response: reqwest::Response, id: Option<RequestId>) -> RandmintError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
        message: text,
        ..ErrorBody::default()
    });
    map_error(status, body, id)
}

/// Rebuild a typed error from the node's error response.
fn map_error(status: StatusCode, body: ErrorBody, id: Option<RequestId>) -> RandmintError {
    let ErrorBody {
        error,
        message,
        id: body_id,
        state,
        subject,
        active,
        required,
        available,
        reason,
    } = body;

    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match (error.as_str(), body_id.or(id), state) {
        ("not_found", Some(id), _) => RandmintError::NotFound { id },
        ("unknown_request", Some(id), _) => RandmintError::UnknownRequest { id },
        ("not_ready", Some(id), Some(state)) => RandmintError::NotReady { id, state },
        ("already_transitioned", Some(id), Some(current)) => {
            RandmintError::AlreadyTransitioned { id, current }
        }
        ("request_failed", Some(id), _) => RandmintError::RequestFailed {
            id,
            reason: reason.unwrap_or(message),
        },
        ("subject_busy", ..) => match (subject, active) {
            (Some(subject), Some(active)) => RandmintError::SubjectBusy { subject, active },
            _ => RandmintError::InvalidParams { message },
        },
        ("insufficient_funds", ..) => match (required, available) {
            (Some(required), Some(available)) => {
                RandmintError::InsufficientFunds { required, available }
            }
            _ => RandmintError::InvalidParams { message },
        },
        ("invalid_request", ..) => match subject {
            Some(subject) => RandmintError::InvalidSubject { subject, message },
            None => RandmintError::InvalidParams { message },
        },
        ("oracle_unavailable", ..) => RandmintError::SubmissionRejected { message },
        ("timeout", ..) => RandmintError::Timeout {
            duration_ms: 0,
            message,
        },
        ("internal", ..) => RandmintError::Internal(message),
        _ if status.is_server_error() => RandmintError::Transport(message),
        _ => RandmintError::InvalidParams { message },
    }
}
