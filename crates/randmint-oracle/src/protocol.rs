//! Oracle wire messages.

use chrono::{DateTime, Utc};
use randmint_core::{KeyHash, Randomness, RequestId, StrategyParams, SubjectId};
use serde::{Deserialize, Serialize};

/// Message types exchanged with the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleMessage {
    /// Outbound request for randomness.
    RandomnessRequested(OracleRequest),

    /// Inbound delivery of randomness for a request.
    RandomnessDelivered { id: RequestId, randomness: Randomness },
}

/// A request submitted to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Correlation token the oracle echoes back in its callback.
    pub id: RequestId,

    /// The entity the randomness is for.
    pub subject: SubjectId,

    /// Oracle configuration servicing the request.
    pub key_hash: KeyHash,

    /// Fee attached to the request.
    pub fee: u64,
}

/// Acknowledgement of a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAck {
    /// The acknowledged request.
    pub id: RequestId,

    /// When the oracle accepted the request.
    pub accepted_at: DateTime<Utc>,
}

impl OracleRequest {
    /// Create a request from strategy parameters.
    pub fn new(id: RequestId, subject: SubjectId, params: &StrategyParams) -> Self {
        Self {
            id,
            subject,
            key_hash: params.key_hash.clone(),
            fee: params.fee,
        }
    }
}

impl OracleAck {
    /// Acknowledge a request now.
    pub fn now(id: RequestId) -> Self {
        Self {
            id,
            accepted_at: Utc::now(),
        }
    }
}
