//! Caller-facing facade over the whole request/fulfill workflow.

use std::collections::BTreeSet;
use std::sync::Arc;

use randmint_core::{
    Artifact, ArtifactComputer, DigestComputer, Randomness, RandmintError, RequestId,
    RequestRecord, RequestState, Result, StrategyParams, SubjectId, Transition,
};
use randmint_ledger::{InMemoryLedger, RequestLedger};
use randmint_oracle::{
    CallbackReceiver, DeliveryOutcome, FeeAccount, MockConfig, MockCoordinator, OracleClient,
    OracleMessage, OracleTransport,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::completion::CompletionEngine;
use crate::coordinator::{CoordinatorConfig, WaitCoordinator, WaitOutcome};

/// Reason recorded on records failed by [`Workflow::cancel`].
pub const CANCELLED_REASON: &str = "cancelled";

/// The request/fulfill workflow.
///
/// Requesting and completing are independent operations: `start_workflow`
/// returns as soon as the oracle has acknowledged, and `finalize` may be
/// called whenever the caller likes.
pub struct Workflow {
    ledger: Arc<dyn RequestLedger>,
    client: Arc<OracleClient>,
    receiver: Arc<CallbackReceiver>,
    engine: Arc<CompletionEngine>,
    coordinator: Arc<WaitCoordinator>,

    /// Sequential token numbers for `start_next`.
    tokens: Mutex<TokenCounter>,
}

/// Hands out token numbers, taking back the ones whose request failed.
#[derive(Debug, Default)]
struct TokenCounter {
    next: u64,
    released: BTreeSet<u64>,
}

impl TokenCounter {
    fn reserve(&mut self) -> u64 {
        if let Some(number) = self.released.pop_first() {
            return number;
        }
        let number = self.next;
        self.next += 1;
        number
    }

    fn release(&mut self, number: u64) {
        self.released.insert(number);
    }
}

impl Workflow {
    /// Assemble a workflow from its collaborators.
    ///
    /// `receiver` must write to `ledger`; it is taken separately because the
    /// transport usually needs it first.
    pub fn new(
        ledger: Arc<dyn RequestLedger>,
        receiver: Arc<CallbackReceiver>,
        transport: Arc<dyn OracleTransport>,
        fees: Arc<FeeAccount>,
        computer: Arc<dyn ArtifactComputer>,
        config: CoordinatorConfig,
    ) -> Self {
        let client = Arc::new(OracleClient::new(ledger.clone(), transport, fees));
        let engine = Arc::new(CompletionEngine::new(ledger.clone(), computer));
        let coordinator = Arc::new(WaitCoordinator::new(
            client.clone(),
            ledger.clone(),
            engine.clone(),
            config,
        ));

        Self {
            ledger,
            client,
            receiver,
            engine,
            coordinator,
            tokens: Mutex::new(TokenCounter::default()),
        }
    }

    /// In-memory workflow backed by a [`MockCoordinator`].
    pub fn with_mock(
        initial_funds: u64,
        mock_config: MockConfig,
        config: CoordinatorConfig,
    ) -> (Self, Arc<MockCoordinator>) {
        let ledger: Arc<dyn RequestLedger> = Arc::new(InMemoryLedger::new());
        let receiver = Arc::new(CallbackReceiver::new(ledger.clone()));
        let mock = Arc::new(MockCoordinator::new(receiver.clone(), mock_config));

        let workflow = Self::new(
            ledger,
            receiver,
            mock.clone(),
            Arc::new(FeeAccount::new(initial_funds)),
            Arc::new(DigestComputer::default()),
            config,
        );
        (workflow, mock)
    }

    pub fn ledger(&self) -> &Arc<dyn RequestLedger> {
        &self.ledger
    }

    pub fn fees(&self) -> &Arc<FeeAccount> {
        self.client.fees()
    }

    pub fn engine(&self) -> &Arc<CompletionEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<WaitCoordinator> {
        &self.coordinator
    }

    /// Request randomness for `subject`. Returns once the oracle has
    /// acknowledged; the record is then `RandomnessRequested`.
    pub async fn start_workflow(&self, subject: SubjectId, params: StrategyParams) -> Result<RequestId> {
        self.client.request(subject, params).await
    }

    /// Request randomness for the next sequential token.
    ///
    /// A number is only used up once its request is accepted. Numbers whose
    /// subject is already busy are skipped.
    pub async fn start_next(&self, params: StrategyParams) -> Result<RequestId> {
        loop {
            let number = self.tokens.lock().await.reserve();

            match self.start_workflow(SubjectId::token(number), params.clone()).await {
                Ok(id) => return Ok(id),
                Err(RandmintError::SubjectBusy { subject, .. }) => {
                    debug!(subject = %subject, "Token already taken, trying the next one");
                }
                Err(e) => {
                    self.tokens.lock().await.release(number);
                    return Err(e);
                }
            }
        }
    }

    /// Current state of request `id`.
    pub async fn poll_status(&self, id: RequestId) -> Result<RequestState> {
        Ok(self.ledger.get(id).await?.state)
    }

    /// Full record of request `id`.
    pub async fn record(&self, id: RequestId) -> Result<RequestRecord> {
        self.ledger.get(id).await
    }

    /// Complete request `id`. `NotReady` means try again later.
    pub async fn finalize(&self, id: RequestId) -> Result<Artifact> {
        self.engine.complete(id).await
    }

    /// Deliver randomness for request `id`.
    pub async fn deliver(&self, id: RequestId, randomness: Randomness) -> Result<DeliveryOutcome> {
        self.receiver.deliver(id, randomness).await
    }

    /// Deliver a wire-format oracle message.
    pub async fn deliver_message(&self, message: OracleMessage) -> Result<DeliveryOutcome> {
        self.receiver.deliver_message(message).await
    }

    /// Abandon request `id`. Later deliveries for it are dropped.
    ///
    /// Only requests still waiting on the oracle can be cancelled; anything
    /// further along returns `AlreadyTransitioned`.
    pub async fn cancel(&self, id: RequestId) -> Result<RequestRecord> {
        let record = self.ledger.get(id).await?;
        if !matches!(
            record.state,
            RequestState::Created | RequestState::RandomnessRequested
        ) {
            return Err(RandmintError::AlreadyTransitioned {
                id,
                current: record.state,
            });
        }

        let record = self
            .ledger
            .transition(
                id,
                Transition::Fail {
                    reason: CANCELLED_REASON.to_string(),
                },
            )
            .await?;
        info!(request_id = %id, subject = %record.subject, "Request cancelled");
        Ok(record)
    }

    /// Request, wait and complete in one call.
    pub async fn run(
        &self,
        subject: SubjectId,
        params: StrategyParams,
        cancel: CancellationToken,
    ) -> Result<WaitOutcome> {
        self.coordinator.run(subject, params, cancel).await
    }

    /// The artifact of a completed request, if any.
    pub async fn artifact(&self, id: RequestId) -> Result<Option<Artifact>> {
        let record = self.ledger.get(id).await?;
        Ok(match record.state {
            RequestState::Completed => record.artifact,
            _ => None,
        })
    }
}
