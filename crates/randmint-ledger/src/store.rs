//! Request ledger implementations.
//!
//! The ledger is the only shared mutable state in a workflow. Every mutation
//! goes through [`RequestLedger::transition`], which is atomic per record:
//! two writers racing on the same record never both succeed, and writers on
//! different records never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use randmint_core::{
    RandmintError, RequestId, RequestRecord, RequestState, Result, StrategyParams, SubjectId,
    Transition,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::audit::LedgerSnapshot;
use crate::subscription::{LedgerEvent, LedgerSubscription, SubscriptionFilter, SubscriptionManager};

/// Durable record of every randomness request.
#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Create a record in `Created` state and return its id.
    async fn create(&self, subject: SubjectId, params: StrategyParams) -> Result<RequestId>;

    /// Get a record by id.
    async fn get(&self, id: RequestId) -> Result<RequestRecord>;

    /// Atomically apply a transition and return the committed record.
    async fn transition(&self, id: RequestId, transition: Transition) -> Result<RequestRecord>;

    /// The non-terminal record for a subject, if any.
    async fn find_active(&self, subject: &SubjectId) -> Result<Option<RequestRecord>>;

    /// All records.
    async fn list(&self) -> Result<Vec<RequestRecord>>;

    /// All records currently in `state`.
    async fn list_in_state(&self, state: RequestState) -> Result<Vec<RequestRecord>>;

    /// Subscribe to committed changes.
    async fn subscribe(&self, filter: SubscriptionFilter) -> LedgerSubscription;

    /// Take an audit snapshot.
    async fn snapshot(&self) -> Result<LedgerSnapshot>;
}

type RecordCell = Arc<Mutex<RequestRecord>>;

/// In-memory implementation of [`RequestLedger`].
///
/// The id map lock is held only long enough to look up or insert a record
/// cell; transitions lock the record's own mutex.
pub struct InMemoryLedger {
    /// id -> record cell.
    records: RwLock<HashMap<RequestId, RecordCell>>,

    /// subject -> id of its latest non-terminal record.
    active: Mutex<HashMap<SubjectId, RequestId>>,

    /// Change notifications.
    subscriptions: SubscriptionManager,
}

impl InMemoryLedger {
    /// Create a new in-memory ledger.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            subscriptions: SubscriptionManager::new(),
        }
    }

    async fn cell(&self, id: RequestId) -> Result<RecordCell> {
        let records = self.records.read().await;
        records
            .get(&id)
            .cloned()
            .ok_or(RandmintError::NotFound { id })
    }

    async fn cells(&self) -> Vec<RecordCell> {
        let records = self.records.read().await;
        records.values().cloned().collect()
    }

    /// Drop the subject index entry once its record is terminal.
    async fn release_subject(&self, subject: &SubjectId, id: RequestId) {
        let mut active = self.active.lock().await;
        if active.get(subject) == Some(&id) {
            active.remove(subject);
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestLedger for InMemoryLedger {
    async fn create(&self, subject: SubjectId, params: StrategyParams) -> Result<RequestId> {
        params.validate()?;

        let mut active = self.active.lock().await;

        if let Some(existing) = active.get(&subject).copied() {
            // The index may trail a record that just went terminal.
            let cell = self.cell(existing).await?;
            let state = cell.lock().await.state;
            if state.is_active() {
                return Err(RandmintError::SubjectBusy {
                    subject: subject.to_string(),
                    active: existing,
                });
            }
        }

        let id = RequestId::new();
        let record = RequestRecord::new(id, subject.clone(), params);

        self.records
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record)));
        active.insert(subject.clone(), id);

        info!(request_id = %id, subject = %subject, "Request record created");
        Ok(id)
    }

    async fn get(&self, id: RequestId) -> Result<RequestRecord> {
        let cell = self.cell(id).await?;
        let record = cell.lock().await.clone();
        Ok(record)
    }

    async fn transition(&self, id: RequestId, transition: Transition) -> Result<RequestRecord> {
        let cell = self.cell(id).await?;

        let committed = {
            let mut record = cell.lock().await;
            let from = record.state;

            if let Err(err) = record.apply(transition) {
                match &err {
                    RandmintError::AlreadyTransitioned { current, .. } => {
                        debug!(request_id = %id, current = %current, "Transition lost race");
                    }
                    e if e.is_invariant_violation() => {
                        error!(request_id = %id, from = %from, error = %e, "Ledger invariant violation");
                    }
                    _ => {}
                }
                return Err(err);
            }

            info!(request_id = %id, from = %from, to = %record.state, "Request transitioned");

            // Published under the record lock so events for one record stay ordered.
            self.subscriptions.publish(LedgerEvent {
                id,
                from,
                to: record.state,
                record: record.clone(),
                timestamp: Utc::now(),
            });

            record.clone()
        };

        if committed.state.is_terminal() {
            self.release_subject(&committed.subject, id).await;
        }

        Ok(committed)
    }

    async fn find_active(&self, subject: &SubjectId) -> Result<Option<RequestRecord>> {
        let id = {
            let active = self.active.lock().await;
            active.get(subject).copied()
        };

        match id {
            Some(id) => {
                let record = self.get(id).await?;
                Ok(record.state.is_active().then_some(record))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<RequestRecord>> {
        let mut records = Vec::new();
        for cell in self.cells().await {
            records.push(cell.lock().await.clone());
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn list_in_state(&self, state: RequestState) -> Result<Vec<RequestRecord>> {
        let records = self.list().await?;
        Ok(records.into_iter().filter(|r| r.state == state).collect())
    }

    async fn subscribe(&self, filter: SubscriptionFilter) -> LedgerSubscription {
        self.subscriptions.subscribe(filter)
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(LedgerSnapshot::new(self.list().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::{ArtifactComputer, DigestComputer, KeyHash, Randomness};

    fn params() -> StrategyParams {
        let key_hash = KeyHash::parse(format!("0x{}", "47".repeat(32))).unwrap();
        StrategyParams::new(100, key_hash)
    }

    fn subject(s: &str) -> SubjectId {
        SubjectId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ledger = InMemoryLedger::new();

        let id = ledger.create(subject("token-1"), params()).await.unwrap();
        let record = ledger.get(id).await.unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.state, RequestState::Created);
        assert!(record.randomness.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let ledger = InMemoryLedger::new();
        let result = ledger.get(RequestId::new()).await;
        assert!(matches!(result, Err(RandmintError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_transition_unknown() {
        let ledger = InMemoryLedger::new();
        let result = ledger.transition(RequestId::new(), Transition::Requested).await;
        assert!(matches!(result, Err(RandmintError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_one_active_record_per_subject() {
        let ledger = InMemoryLedger::new();

        let first = ledger.create(subject("token-1"), params()).await.unwrap();
        let busy = ledger.create(subject("token-1"), params()).await;
        assert!(matches!(busy, Err(RandmintError::SubjectBusy { active, .. }) if active == first));

        ledger.create(subject("token-2"), params()).await.unwrap();

        ledger
            .transition(
                first,
                Transition::Fail {
                    reason: "rejected".to_string(),
                },
            )
            .await
            .unwrap();

        let second = ledger.create(subject("token-1"), params()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(
            ledger.find_active(&subject("token-1")).await.unwrap().map(|r| r.id),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_transitions_are_monotonic() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create(subject("token-1"), params()).await.unwrap();
        let randomness = Randomness::from(77777u64);

        ledger.transition(id, Transition::Requested).await.unwrap();
        ledger
            .transition(id, Transition::Fulfill { randomness })
            .await
            .unwrap();

        let regress = ledger.transition(id, Transition::Requested).await;
        assert!(matches!(regress, Err(RandmintError::AlreadyTransitioned { .. })));

        let artifact = DigestComputer::default().compute(randomness);
        let record = ledger
            .transition(id, Transition::Complete { artifact })
            .await
            .unwrap();

        assert_eq!(record.state, RequestState::Completed);
        let states: Vec<RequestState> = record.history.iter().map(|h| h.to).collect();
        assert_eq!(
            states,
            vec![
                RequestState::RandomnessRequested,
                RequestState::RandomnessFulfilled,
                RequestState::Completed
            ]
        );
        assert!(ledger.find_active(&subject("token-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_racing_fulfillments_have_one_winner() {
        let ledger = Arc::new(InMemoryLedger::new());
        let id = ledger.create(subject("token-1"), params()).await.unwrap();
        ledger.transition(id, Transition::Requested).await.unwrap();

        let tasks = (0..8u64).map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .transition(
                        id,
                        Transition::Fulfill {
                            randomness: Randomness::from(i),
                        },
                    )
                    .await
            })
        });

        let results: Vec<Result<RequestRecord>> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(RandmintError::AlreadyTransitioned { .. })))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(losers, 7);
    }

    #[tokio::test]
    async fn test_subscription_sees_transitions() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create(subject("token-1"), params()).await.unwrap();
        let mut sub = ledger.subscribe(SubscriptionFilter::request(id)).await;

        ledger.transition(id, Transition::Requested).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.from, RequestState::Created);
        assert_eq!(event.to, RequestState::RandomnessRequested);
        assert_eq!(event.record.state, RequestState::RandomnessRequested);
    }

    #[tokio::test]
    async fn test_list_and_snapshot() {
        let ledger = InMemoryLedger::new();
        let a = ledger.create(subject("token-1"), params()).await.unwrap();
        ledger.create(subject("token-2"), params()).await.unwrap();
        ledger.transition(a, Transition::Requested).await.unwrap();

        assert_eq!(ledger.list().await.unwrap().len(), 2);
        assert_eq!(
            ledger
                .list_in_state(RequestState::RandomnessRequested)
                .await
                .unwrap()
                .len(),
            1
        );

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.awaiting_fulfillment().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let ledger = InMemoryLedger::new();
        let mut bad = params();
        bad.fee = 0;
        let result = ledger.create(subject("token-1"), bad).await;
        assert!(matches!(result, Err(RandmintError::InvalidParams { .. })));
    }
}
