//! Oracle client: the request half of the workflow.

use std::sync::Arc;

use randmint_core::{RandmintError, RequestId, Result, StrategyParams, SubjectId, Transition};
use randmint_ledger::RequestLedger;
use tracing::{error, info, warn};

use crate::fees::FeeAccount;
use crate::protocol::OracleRequest;
use crate::transport::OracleTransport;

/// Submits randomness requests and records them in the ledger.
///
/// The client never waits for randomness. It returns as soon as the oracle
/// has acknowledged the submission.
pub struct OracleClient {
    ledger: Arc<dyn RequestLedger>,
    transport: Arc<dyn OracleTransport>,
    fees: Arc<FeeAccount>,
}

impl OracleClient {
    /// Create a new oracle client.
    pub fn new(
        ledger: Arc<dyn RequestLedger>,
        transport: Arc<dyn OracleTransport>,
        fees: Arc<FeeAccount>,
    ) -> Self {
        Self {
            ledger,
            transport,
            fees,
        }
    }

    /// The fee account requests are paid from.
    pub fn fees(&self) -> &Arc<FeeAccount> {
        &self.fees
    }

    /// Request randomness for `subject`.
    ///
    /// On success the record is in `RandomnessRequested`. If the oracle
    /// refuses the submission the fee is refunded, the record is marked
    /// `Failed`, and `SubmissionRejected` is returned; a retry creates a new
    /// record.
    pub async fn request(&self, subject: SubjectId, params: StrategyParams) -> Result<RequestId> {
        params.validate()?;

        self.fees.try_debit(params.fee).map_err(|e| {
            warn!(subject = %subject, fee = params.fee, error = %e, "Cannot fund randomness request");
            e
        })?;

        let id = match self.ledger.create(subject.clone(), params.clone()).await {
            Ok(id) => id,
            Err(e) => {
                self.fees.refund(params.fee);
                return Err(e);
            }
        };

        let request = OracleRequest::new(id, subject.clone(), &params);

        match self.transport.submit_request(&request).await {
            Ok(ack) => {
                match self.ledger.transition(id, Transition::Requested).await {
                    Ok(_) => {}
                    // Only a cancel can get here first; the fee is spent either way.
                    Err(e) if e.is_benign() => {
                        info!(request_id = %id, error = %e, "Request moved before acknowledgement was recorded");
                    }
                    Err(e) => return Err(e),
                }
                info!(
                    request_id = %id,
                    subject = %subject,
                    fee = params.fee,
                    accepted_at = %ack.accepted_at,
                    "Randomness requested"
                );
                Ok(id)
            }
            Err(e) => {
                self.fees.refund(params.fee);
                let reason = e.to_string();
                warn!(request_id = %id, subject = %subject, error = %reason, "Oracle rejected request");

                if let Err(fail_err) = self
                    .ledger
                    .transition(id, Transition::Fail { reason: reason.clone() })
                    .await
                {
                    if !fail_err.is_benign() {
                        error!(request_id = %id, error = %fail_err, "Failed to record rejection");
                    }
                }

                Err(match e {
                    RandmintError::SubmissionRejected { .. } => e,
                    other => RandmintError::SubmissionRejected {
                        message: other.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OracleAck;
    use async_trait::async_trait;
    use randmint_core::{KeyHash, RequestState};
    use randmint_ledger::InMemoryLedger;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        reject: AtomicBool,
        submitted: Mutex<Vec<OracleRequest>>,
    }

    #[async_trait]
    impl OracleTransport for RecordingTransport {
        async fn submit_request(&self, request: &OracleRequest) -> Result<OracleAck> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(RandmintError::Transport("connection reset".to_string()));
            }
            self.submitted.lock().await.push(request.clone());
            Ok(OracleAck::now(request.id))
        }
    }

    fn params(fee: u64) -> StrategyParams {
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        StrategyParams::new(fee, key_hash)
    }

    fn setup(balance: u64) -> (OracleClient, Arc<InMemoryLedger>, Arc<RecordingTransport>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let transport = Arc::new(RecordingTransport::default());
        let client = OracleClient::new(
            ledger.clone(),
            transport.clone(),
            Arc::new(FeeAccount::new(balance)),
        );
        (client, ledger, transport)
    }

    #[tokio::test]
    async fn test_request_records_and_submits() {
        let (client, ledger, transport) = setup(1_000);

        let id = client.request(SubjectId::token(1), params(100)).await.unwrap();

        let record = ledger.get(id).await.unwrap();
        assert_eq!(record.state, RequestState::RandomnessRequested);
        assert!(record.requested_at.is_some());
        assert_eq!(client.fees().balance(), 900);

        let submitted = transport.submitted.lock().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].id, id);
        assert_eq!(submitted[0].fee, 100);
    }

    #[tokio::test]
    async fn test_insufficient_funds_creates_nothing() {
        let (client, ledger, transport) = setup(50);

        let result = client.request(SubjectId::token(1), params(100)).await;
        assert!(matches!(
            result,
            Err(RandmintError::InsufficientFunds {
                required: 100,
                available: 50
            })
        ));

        assert!(ledger.list().await.unwrap().is_empty());
        assert!(transport.submitted.lock().await.is_empty());
        assert_eq!(client.fees().balance(), 50);
    }

    #[tokio::test]
    async fn test_rejection_fails_record_and_refunds() {
        let (client, ledger, transport) = setup(1_000);
        transport.reject.store(true, Ordering::SeqCst);

        let result = client.request(SubjectId::token(1), params(100)).await;
        assert!(matches!(result, Err(RandmintError::SubmissionRejected { .. })));
        assert_eq!(client.fees().balance(), 1_000);

        let records = ledger.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, RequestState::Failed);

        // The subject is free again, so a retry gets a fresh record.
        transport.reject.store(false, Ordering::SeqCst);
        let id = client.request(SubjectId::token(1), params(100)).await.unwrap();
        assert_ne!(id, records[0].id);
        assert_eq!(ledger.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_busy_subject_refunds_fee() {
        let (client, _ledger, _transport) = setup(1_000);

        client.request(SubjectId::token(1), params(100)).await.unwrap();
        let busy = client.request(SubjectId::token(1), params(100)).await;

        assert!(matches!(busy, Err(RandmintError::SubjectBusy { .. })));
        assert_eq!(client.fees().balance(), 900);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_debit() {
        let (client, _ledger, _transport) = setup(1_000);
        let result = client.request(SubjectId::token(1), params(0)).await;
        assert!(matches!(result, Err(RandmintError::InvalidParams { .. })));
        assert_eq!(client.fees().balance(), 1_000);
    }
}
