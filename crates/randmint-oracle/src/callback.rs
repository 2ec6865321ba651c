//! Callback receiver: the fulfill half of the workflow.
//!
//! Deliveries may arrive late, twice, or for requests this ledger never
//! made. Only the first delivery for a request awaiting randomness is
//! recorded; everything else is reported back without touching the ledger.

use std::sync::Arc;

use randmint_core::{Randomness, RandmintError, RequestId, RequestState, Result, Transition};
use randmint_ledger::RequestLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::OracleMessage;

/// What a successful delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Randomness recorded; the record is now `RandomnessFulfilled`.
    Fulfilled,

    /// The same randomness was already recorded. Nothing changed.
    Duplicate,
}

/// Accepts oracle deliveries and records them in the ledger.
pub struct CallbackReceiver {
    ledger: Arc<dyn RequestLedger>,
}

impl CallbackReceiver {
    /// Create a new callback receiver.
    pub fn new(ledger: Arc<dyn RequestLedger>) -> Self {
        Self { ledger }
    }

    /// Record `randomness` for request `id`.
    ///
    /// Returns `UnknownRequest` for ids the ledger does not know, for records
    /// not yet acknowledged or already failed, and for conflicting late
    /// deliveries.
    pub async fn deliver(&self, id: RequestId, randomness: Randomness) -> Result<DeliveryOutcome> {
        let record = match self.ledger.get(id).await {
            Ok(record) => record,
            Err(RandmintError::NotFound { .. }) => {
                warn!(request_id = %id, "Delivery for unknown request");
                return Err(RandmintError::UnknownRequest { id });
            }
            Err(e) => return Err(e),
        };

        match record.state {
            RequestState::RandomnessRequested => {
                match self.ledger.transition(id, Transition::Fulfill { randomness }).await {
                    Ok(_) => {
                        info!(request_id = %id, subject = %record.subject, "Randomness fulfilled");
                        Ok(DeliveryOutcome::Fulfilled)
                    }
                    Err(RandmintError::AlreadyTransitioned { .. }) => {
                        // Another delivery won; judge this one against the winner.
                        let current = self.ledger.get(id).await?;
                        self.judge_late(id, randomness, current.state, current.randomness)
                    }
                    Err(e) => Err(e),
                }
            }
            state => self.judge_late(id, randomness, state, record.randomness),
        }
    }

    /// Handle an inbound oracle message.
    pub async fn deliver_message(&self, message: OracleMessage) -> Result<DeliveryOutcome> {
        match message {
            OracleMessage::RandomnessDelivered { id, randomness } => {
                self.deliver(id, randomness).await
            }
            OracleMessage::RandomnessRequested(request) => Err(RandmintError::SerializationError(
                format!("unexpected inbound request message for {}", request.id),
            )),
        }
    }

    fn judge_late(
        &self,
        id: RequestId,
        randomness: Randomness,
        state: RequestState,
        recorded: Option<Randomness>,
    ) -> Result<DeliveryOutcome> {
        match (state, recorded) {
            (RequestState::RandomnessFulfilled | RequestState::Completed, Some(r)) if r == randomness => {
                debug!(request_id = %id, state = %state, "Duplicate delivery ignored");
                Ok(DeliveryOutcome::Duplicate)
            }
            (RequestState::RandomnessFulfilled | RequestState::Completed, Some(_)) => {
                warn!(request_id = %id, state = %state, "Conflicting delivery dropped");
                Err(RandmintError::UnknownRequest { id })
            }
            _ => {
                warn!(request_id = %id, state = %state, "Delivery for request not awaiting randomness");
                Err(RandmintError::UnknownRequest { id })
            }
        }
    }
}
