//! Point-in-time views of the ledger for auditing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use randmint_core::{RequestId, RequestRecord, RequestState, SubjectId, TransitionEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time snapshot of every record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Unique ID for this snapshot.
    pub id: Uuid,

    /// Timestamp when the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// All records at snapshot time.
    pub records: HashMap<RequestId, RequestRecord>,
}

impl LedgerSnapshot {
    /// Build a snapshot from a set of records.
    pub fn new(records: impl IntoIterator<Item = RequestRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    /// Get a record from the snapshot.
    pub fn get(&self, id: &RequestId) -> Option<&RequestRecord> {
        self.records.get(id)
    }

    /// Transition history of a record.
    pub fn history(&self, id: &RequestId) -> Option<&[TransitionEvent]> {
        self.records.get(id).map(|r| r.history.as_slice())
    }

    /// Every request ever made for a subject, oldest first.
    pub fn for_subject(&self, subject: &SubjectId) -> Vec<&RequestRecord> {
        let mut records: Vec<&RequestRecord> = self
            .records
            .values()
            .filter(|r| &r.subject == subject)
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Number of records per state.
    pub fn count_by_state(&self) -> HashMap<RequestState, usize> {
        let mut counts = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.state).or_insert(0) += 1;
        }
        counts
    }

    /// Records still waiting on the oracle.
    pub fn awaiting_fulfillment(&self) -> Vec<&RequestRecord> {
        self.records
            .values()
            .filter(|r| r.state == RequestState::RandomnessRequested)
            .collect()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::{KeyHash, Randomness, StrategyParams, Transition};

    fn create_test_record(subject: &str) -> RequestRecord {
        let key_hash = KeyHash::parse(format!("0x{}", "cd".repeat(32))).unwrap();
        RequestRecord::new(
            RequestId::new(),
            SubjectId::parse(subject).unwrap(),
            StrategyParams::new(10, key_hash),
        )
    }

    #[test]
    fn test_snapshot_counts() {
        let mut a = create_test_record("token-1");
        a.apply(Transition::Requested).unwrap();
        let mut b = create_test_record("token-2");
        b.apply(Transition::Requested).unwrap();
        b.apply(Transition::Fulfill {
            randomness: Randomness::from(4u64),
        })
        .unwrap();
        let c = create_test_record("token-3");

        let snapshot = LedgerSnapshot::new(vec![a.clone(), b, c]);

        assert_eq!(snapshot.len(), 3);
        let counts = snapshot.count_by_state();
        assert_eq!(counts.get(&RequestState::RandomnessRequested), Some(&1));
        assert_eq!(counts.get(&RequestState::RandomnessFulfilled), Some(&1));
        assert_eq!(counts.get(&RequestState::Created), Some(&1));
        assert_eq!(snapshot.awaiting_fulfillment().len(), 1);
        assert_eq!(snapshot.history(&a.id).map(|h| h.len()), Some(1));
    }

    #[test]
    fn test_for_subject() {
        let mut first = create_test_record("token-9");
        first
            .apply(Transition::Fail {
                reason: "cancelled".to_string(),
            })
            .unwrap();
        let mut second = create_test_record("token-9");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let other = create_test_record("token-10");

        let snapshot = LedgerSnapshot::new(vec![second.clone(), other, first.clone()]);
        let records = snapshot.for_subject(&SubjectId::parse("token-9").unwrap());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first.id);
        assert_eq!(records[1].id, second.id);
    }
}
