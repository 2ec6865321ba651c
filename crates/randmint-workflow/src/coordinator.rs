//! Wait/poll coordinator.
//!
//! Drives one request from submission to completion without ever blocking
//! the request path on the oracle. Waiting combines a bounded exponential
//! backoff poll with ledger change notifications, so a delivery wakes the
//! waiter immediately while a missed notification costs at most one
//! backoff interval.

use std::sync::Arc;
use std::time::Duration;

use randmint_core::{
    Artifact, BackoffPolicy, RandmintError, RequestId, Result, StrategyParams, SubjectId,
};
use randmint_ledger::{LedgerEvent, LedgerSubscription, RequestLedger, SubscriptionFilter};
use randmint_oracle::OracleClient;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::CompletionEngine;

/// Configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Poll schedule and total wait budget.
    pub backoff: BackoffPolicy,

    /// Submissions attempted before a rejection is surfaced.
    pub max_submit_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_submit_attempts: 3,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The request completed.
    Completed(Artifact),

    /// The wait budget ran out. The request is untouched and may still
    /// complete later.
    TimedOut { id: RequestId, waited: Duration },

    /// The caller stopped waiting. The request stays live.
    Cancelled { id: RequestId },
}

impl WaitOutcome {
    /// The artifact, if the request completed.
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            WaitOutcome::Completed(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Coordinates request, wait and completion for callers.
pub struct WaitCoordinator {
    client: Arc<OracleClient>,
    ledger: Arc<dyn RequestLedger>,
    engine: Arc<CompletionEngine>,
    config: CoordinatorConfig,
}

impl WaitCoordinator {
    /// Create a new coordinator.
    pub fn new(
        client: Arc<OracleClient>,
        ledger: Arc<dyn RequestLedger>,
        engine: Arc<CompletionEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            client,
            ledger,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Request randomness for `subject` and wait for the completed artifact.
    pub async fn run(
        &self,
        subject: SubjectId,
        params: StrategyParams,
        cancel: CancellationToken,
    ) -> Result<WaitOutcome> {
        let id = self.submit(subject, params, &cancel).await?;
        self.wait_and_complete(id, cancel).await
    }

    /// Submit with retries on oracle rejection.
    ///
    /// Cancellation during a retry pause surfaces the last rejection, since no
    /// live request exists at that point.
    async fn submit(
        &self,
        subject: SubjectId,
        params: StrategyParams,
        cancel: &CancellationToken,
    ) -> Result<RequestId> {
        let max_attempts = self.config.max_submit_attempts.max(1);
        let mut backoff = self.config.backoff.start();
        let mut attempt = 1;

        loop {
            match self.client.request(subject.clone(), params.clone()).await {
                Ok(id) => return Ok(id),
                Err(e @ RandmintError::SubmissionRejected { .. }) if attempt < max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        subject = %subject,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Submission rejected, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(e),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for request `id` to be fulfilled, then complete it.
    ///
    /// Works for any live request, including ones whose original waiter has
    /// gone away.
    pub async fn wait_and_complete(
        &self,
        id: RequestId,
        cancel: CancellationToken,
    ) -> Result<WaitOutcome> {
        // Subscribe before the first poll so no transition slips between them.
        let mut events = Some(self.ledger.subscribe(SubscriptionFilter::request(id)).await);

        let started = Instant::now();
        let deadline = started + self.config.backoff.max_wait();
        let mut backoff = self.config.backoff.start();
        let mut poll: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(request_id = %id, "Wait cancelled");
                return Ok(WaitOutcome::Cancelled { id });
            }

            poll += 1;
            match self.engine.complete(id).await {
                Ok(artifact) => {
                    info!(request_id = %id, polls = poll, "Wait finished with artifact");
                    return Ok(WaitOutcome::Completed(artifact));
                }
                Err(RandmintError::NotReady { state, .. }) => {
                    debug!(request_id = %id, poll, state = %state, "Not ready");
                }
                Err(e) if e.is_retryable() => {
                    warn!(request_id = %id, poll, error = %e, "Transient error while waiting, will retry");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                info!(request_id = %id, waited_ms = waited.as_millis() as u64, "Wait timed out");
                return Ok(WaitOutcome::TimedOut { id, waited });
            }

            let delay = backoff.next_delay().min(deadline - now);

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(request_id = %id, "Wait cancelled");
                    return Ok(WaitOutcome::Cancelled { id });
                }
                _ = tokio::time::sleep(delay) => {}
                Some(event) = next_event(&mut events) => {
                    debug!(request_id = %id, to = %event.to, "Woken by ledger change");
                }
            }
        }
    }
}

/// Next change for the watched record. Pends forever once the subscription
/// has closed, leaving the backoff poll in charge.
async fn next_event(events: &mut Option<LedgerSubscription>) -> Option<LedgerEvent> {
    let Some(subscription) = events.as_mut() else {
        return std::future::pending().await;
    };

    let event = subscription.recv().await;
    if event.is_none() {
        *events = None;
    }
    event
}
