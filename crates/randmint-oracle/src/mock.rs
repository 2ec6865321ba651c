//! In-process oracle for local networks and tests.
//!
//! Accepts every submission (unless told to reject), remembers it as
//! pending, and delivers randomness either on demand through
//! [`MockCoordinator::call_back_with_randomness`] or automatically after a
//! configured delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use randmint_core::{Randomness, RandmintError, RequestId, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::callback::{CallbackReceiver, DeliveryOutcome};
use crate::protocol::{OracleAck, OracleRequest};
use crate::transport::OracleTransport;

/// Configuration for [`MockCoordinator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Deliver random values this long after acknowledging. `None` waits for
    /// an explicit callback.
    pub auto_fulfil_after: Option<Duration>,

    /// Extra attempts for an automatic delivery the receiver did not accept.
    pub redelivery_attempts: u32,

    /// Pause between automatic delivery attempts.
    pub redelivery_interval: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            auto_fulfil_after: None,
            redelivery_attempts: 5,
            redelivery_interval: Duration::from_millis(50),
        }
    }
}

impl MockConfig {
    /// Deliver automatically after `delay`.
    pub fn auto_fulfil(delay: Duration) -> Self {
        Self {
            auto_fulfil_after: Some(delay),
            ..Self::default()
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<RequestId, OracleRequest>>>;

/// A mock randomness coordinator.
pub struct MockCoordinator {
    config: MockConfig,

    /// Where deliveries go.
    receiver: Arc<CallbackReceiver>,

    /// Acknowledged but not yet delivered requests.
    pending: PendingMap,

    /// Number of upcoming submissions to refuse.
    reject_next: AtomicU32,

    /// Total fees attached to accepted submissions.
    fees_collected: AtomicU64,
}

impl MockCoordinator {
    /// Create a new mock coordinator delivering into `receiver`.
    pub fn new(receiver: Arc<CallbackReceiver>, config: MockConfig) -> Self {
        Self {
            config,
            receiver,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reject_next: AtomicU32::new(0),
            fees_collected: AtomicU64::new(0),
        }
    }

    /// Refuse the next `count` submissions.
    pub fn reject_next(&self, count: u32) {
        self.reject_next.store(count, Ordering::SeqCst);
    }

    /// Requests acknowledged but not yet delivered.
    pub async fn pending(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.pending.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Total fees collected.
    pub fn fees_collected(&self) -> u64 {
        self.fees_collected.load(Ordering::Acquire)
    }

    /// Deliver `randomness` for `id`, as the real coordinator's callback would.
    ///
    /// The id does not have to be pending, so stray deliveries can be
    /// simulated too.
    pub async fn call_back_with_randomness(
        &self,
        id: RequestId,
        randomness: Randomness,
    ) -> Result<DeliveryOutcome> {
        info!(request_id = %id, randomness = %randomness, "Mock coordinator calling back");
        let result = self.receiver.deliver(id, randomness).await;
        if matches!(result, Ok(_) | Err(RandmintError::UnknownRequest { .. })) {
            self.pending.lock().await.remove(&id);
        }
        result
    }

    /// Deliver a fresh random value for `id`.
    pub async fn fulfil(&self, id: RequestId) -> Result<DeliveryOutcome> {
        self.call_back_with_randomness(id, Randomness(rand::random::<u128>()))
            .await
    }

    fn take_rejection(&self) -> bool {
        self.reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn schedule_delivery(&self, id: RequestId, delay: Duration) {
        let receiver = self.receiver.clone();
        let pending = self.pending.clone();
        let attempts = self.config.redelivery_attempts;
        let interval = self.config.redelivery_interval;
        let randomness = Randomness(rand::random::<u128>());

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // The receiver refuses deliveries that beat the acknowledgement
            // into the ledger, so keep trying for a while.
            for attempt in 0..=attempts {
                match receiver.deliver(id, randomness).await {
                    Ok(outcome) => {
                        debug!(request_id = %id, ?outcome, "Automatic delivery accepted");
                        pending.lock().await.remove(&id);
                        return;
                    }
                    Err(RandmintError::UnknownRequest { .. }) if attempt < attempts => {
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => {
                        warn!(request_id = %id, error = %e, "Automatic delivery abandoned");
                        pending.lock().await.remove(&id);
                        return;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl OracleTransport for MockCoordinator {
    async fn submit_request(&self, request: &OracleRequest) -> Result<OracleAck> {
        if self.take_rejection() {
            warn!(request_id = %request.id, "Mock coordinator rejecting request");
            return Err(RandmintError::SubmissionRejected {
                message: "coordinator refused the request".to_string(),
            });
        }

        self.pending.lock().await.insert(request.id, request.clone());
        self.fees_collected.fetch_add(request.fee, Ordering::AcqRel);
        debug!(request_id = %request.id, subject = %request.subject, "Mock coordinator accepted request");

        if let Some(delay) = self.config.auto_fulfil_after {
            self.schedule_delivery(request.id, delay);
        }

        Ok(OracleAck::now(request.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OracleClient;
    use crate::fees::FeeAccount;
    use randmint_core::{KeyHash, RequestState, StrategyParams, SubjectId, Transition};
    use randmint_ledger::{InMemoryLedger, RequestLedger, SubscriptionFilter};

    fn params() -> StrategyParams {
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        StrategyParams::new(100, key_hash)
    }

    fn setup(config: MockConfig) -> (OracleClient, Arc<MockCoordinator>, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let receiver = Arc::new(CallbackReceiver::new(ledger.clone()));
        let mock = Arc::new(MockCoordinator::new(receiver, config));
        let client = OracleClient::new(ledger.clone(), mock.clone(), Arc::new(FeeAccount::new(1_000)));
        (client, mock, ledger)
    }

    #[tokio::test]
    async fn test_manual_callback() {
        let (client, mock, ledger) = setup(MockConfig::default());

        let id = client.request(SubjectId::token(1), params()).await.unwrap();
        assert_eq!(mock.pending().await, vec![id]);
        assert_eq!(mock.fees_collected(), 100);

        let outcome = mock
            .call_back_with_randomness(id, Randomness::from(77777u64))
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Fulfilled);
        assert!(mock.pending().await.is_empty());
        assert_eq!(
            ledger.get(id).await.unwrap().randomness,
            Some(Randomness::from(77777u64))
        );
    }

    #[tokio::test]
    async fn test_reject_next() {
        let (client, mock, _ledger) = setup(MockConfig::default());
        mock.reject_next(1);

        let first = client.request(SubjectId::token(1), params()).await;
        assert!(matches!(first, Err(RandmintError::SubmissionRejected { .. })));
        assert_eq!(mock.fees_collected(), 0);

        client.request(SubjectId::token(1), params()).await.unwrap();
        assert_eq!(mock.fees_collected(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fulfil() {
        let (client, _mock, ledger) = setup(MockConfig::auto_fulfil(Duration::from_secs(2)));
        let mut sub = ledger
            .subscribe(SubscriptionFilter::states(vec![RequestState::RandomnessFulfilled]))
            .await;

        let id = client.request(SubjectId::token(1), params()).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.id, id);
        assert!(event.record.randomness.is_some());
    }

    #[tokio::test]
    async fn test_callback_for_failed_request_clears_pending() {
        let (client, mock, ledger) = setup(MockConfig::default());
        let id = client.request(SubjectId::token(1), params()).await.unwrap();
        ledger
            .transition(
                id,
                Transition::Fail {
                    reason: "cancelled".to_string(),
                },
            )
            .await
            .unwrap();

        let result = mock.call_back_with_randomness(id, Randomness::from(5u64)).await;
        assert!(matches!(result, Err(RandmintError::UnknownRequest { .. })));
        assert!(mock.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_stray_callback_reported() {
        let (_client, mock, _ledger) = setup(MockConfig::default());
        let result = mock
            .call_back_with_randomness(RequestId::new(), Randomness::from(1u64))
            .await;
        assert!(matches!(result, Err(RandmintError::UnknownRequest { .. })));
    }
}
