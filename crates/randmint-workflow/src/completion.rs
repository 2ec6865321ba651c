//! Completion engine.
//!
//! Turns fulfilled randomness into an artifact exactly once. Safe to call
//! any number of times, from any number of tasks, at any point in a
//! request's life.

use std::sync::Arc;

use randmint_core::{
    Artifact, ArtifactComputer, RandmintError, RequestId, RequestRecord, RequestState, Result,
    Transition,
};
use randmint_ledger::RequestLedger;
use tracing::{debug, error, info};

/// Runs the dependent computation for fulfilled requests.
pub struct CompletionEngine {
    ledger: Arc<dyn RequestLedger>,
    computer: Arc<dyn ArtifactComputer>,
}

impl CompletionEngine {
    /// Create a new completion engine.
    pub fn new(ledger: Arc<dyn RequestLedger>, computer: Arc<dyn ArtifactComputer>) -> Self {
        Self { ledger, computer }
    }

    /// Complete request `id` and return its artifact.
    ///
    /// A completed request returns its stored artifact without recomputing.
    /// A request still waiting on the oracle returns `NotReady`.
    pub async fn complete(&self, id: RequestId) -> Result<Artifact> {
        let record = self.ledger.get(id).await?;

        match record.state {
            RequestState::Completed => stored_artifact(&record),
            RequestState::Created | RequestState::RandomnessRequested => {
                Err(RandmintError::NotReady {
                    id,
                    state: record.state,
                })
            }
            RequestState::Failed => Err(RandmintError::RequestFailed {
                id,
                reason: record.failure.clone().unwrap_or_default(),
            }),
            RequestState::RandomnessFulfilled => {
                let Some(randomness) = record.randomness else {
                    error!(request_id = %id, "Fulfilled request has no randomness");
                    return Err(RandmintError::MissingRandomness { id });
                };

                let artifact = self.computer.compute(randomness);

                match self
                    .ledger
                    .transition(
                        id,
                        Transition::Complete {
                            artifact: artifact.clone(),
                        },
                    )
                    .await
                {
                    Ok(_) => {
                        info!(request_id = %id, subject = %record.subject, digest = %artifact.digest, "Request completed");
                        Ok(artifact)
                    }
                    Err(RandmintError::AlreadyTransitioned { .. }) => {
                        debug!(request_id = %id, "Completion raced; using the committed artifact");
                        let winner = self.ledger.get(id).await?;
                        stored_artifact(&winner)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}

fn stored_artifact(record: &RequestRecord) -> Result<Artifact> {
    record.artifact.clone().ok_or_else(|| {
        error!(request_id = %record.id, state = %record.state, "Completed request has no artifact");
        RandmintError::Internal(format!("request {} completed without an artifact", record.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::{DigestComputer, KeyHash, Randomness, StrategyParams, SubjectId};
    use randmint_ledger::InMemoryLedger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how often the computation runs.
    #[derive(Default)]
    struct CountingComputer {
        calls: AtomicUsize,
    }

    impl ArtifactComputer for CountingComputer {
        fn compute(&self, randomness: Randomness) -> Artifact {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DigestComputer::default().compute(randomness)
        }
    }

    async fn fulfilled(ledger: &InMemoryLedger, randomness: u64) -> RequestId {
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        let id = ledger
            .create(SubjectId::token(1), StrategyParams::new(100, key_hash))
            .await
            .unwrap();
        ledger.transition(id, Transition::Requested).await.unwrap();
        ledger
            .transition(
                id,
                Transition::Fulfill {
                    randomness: Randomness::from(randomness),
                },
            )
            .await
            .unwrap();
        id
    }

    fn setup() -> (CompletionEngine, Arc<InMemoryLedger>, Arc<CountingComputer>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let computer = Arc::new(CountingComputer::default());
        (
            CompletionEngine::new(ledger.clone(), computer.clone()),
            ledger,
            computer,
        )
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let (engine, ledger, computer) = setup();
        let id = fulfilled(&ledger, 77777).await;

        let first = engine.complete(id).await.unwrap();
        let second = engine.complete(id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, DigestComputer::default().compute(Randomness::from(77777u64)));
        assert_eq!(computer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.get(id).await.unwrap().state, RequestState::Completed);
    }

    #[tokio::test]
    async fn test_not_ready_before_fulfillment() {
        let (engine, ledger, computer) = setup();
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        let id = ledger
            .create(SubjectId::token(1), StrategyParams::new(100, key_hash))
            .await
            .unwrap();
        ledger.transition(id, Transition::Requested).await.unwrap();

        let result = engine.complete(id).await;
        assert!(matches!(
            result,
            Err(RandmintError::NotReady {
                state: RequestState::RandomnessRequested,
                ..
            })
        ));
        assert_eq!(computer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_request() {
        let (engine, ledger, _computer) = setup();
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        let id = ledger
            .create(SubjectId::token(1), StrategyParams::new(100, key_hash))
            .await
            .unwrap();
        ledger
            .transition(
                id,
                Transition::Fail {
                    reason: "cancelled".to_string(),
                },
            )
            .await
            .unwrap();

        let result = engine.complete(id).await;
        assert!(matches!(result, Err(RandmintError::RequestFailed { reason, .. }) if reason == "cancelled"));
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let (engine, _ledger, _computer) = setup();
        let result = engine.complete(RequestId::new()).await;
        assert!(matches!(result, Err(RandmintError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_racing_completions_agree() {
        let (engine, ledger, _computer) = setup();
        let engine = Arc::new(engine);
        let id = fulfilled(&ledger, 42).await;

        let tasks = (0..6).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.complete(id).await })
        });
        let artifacts: Vec<Artifact> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let stored = ledger.get(id).await.unwrap().artifact.unwrap();
        assert!(artifacts.iter().all(|a| a == &stored));
        assert_eq!(ledger.get(id).await.unwrap().history.len(), 3);
    }
}
