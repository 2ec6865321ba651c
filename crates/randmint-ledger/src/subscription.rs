//! Ledger change subscriptions.

use chrono::{DateTime, Utc};
use randmint_core::{RequestId, RequestRecord, RequestState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the change broadcast channel.
const CHANNEL_CAPACITY: usize = 1024;

/// A committed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// The record that changed.
    pub id: RequestId,

    /// State before the change.
    pub from: RequestState,

    /// State after the change.
    pub to: RequestState,

    /// The record as committed.
    pub record: RequestRecord,

    /// Timestamp of the change.
    pub timestamp: DateTime<Utc>,
}

/// Filter for subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Specific requests to watch.
    pub ids: Option<Vec<RequestId>>,

    /// Target states to watch.
    pub states: Option<Vec<RequestState>>,
}

impl SubscriptionFilter {
    /// Create a filter for a single request.
    pub fn request(id: RequestId) -> Self {
        Self {
            ids: Some(vec![id]),
            ..Default::default()
        }
    }

    /// Create a filter for changes into the given states.
    pub fn states(states: Vec<RequestState>) -> Self {
        Self {
            states: Some(states),
            ..Default::default()
        }
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(ref ids) = self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }

        if let Some(ref states) = self.states {
            if !states.contains(&event.to) {
                return false;
            }
        }

        true
    }
}

/// A subscription to ledger changes. Dropping it unsubscribes.
pub struct LedgerSubscription {
    /// Unique ID for this subscription.
    pub id: Uuid,

    /// Filter for this subscription.
    pub filter: SubscriptionFilter,

    receiver: broadcast::Receiver<LedgerEvent>,
}

impl LedgerSubscription {
    /// Wait for the next matching event.
    ///
    /// Returns `None` once the ledger is gone. Lagging subscribers skip the
    /// events they missed; callers re-read the ledger for current state.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(subscription = %self.id, skipped, "Subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Manager for ledger subscriptions.
pub struct SubscriptionManager {
    /// Sender for broadcasting events.
    sender: broadcast::Sender<LedgerEvent>,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to ledger changes with a filter.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> LedgerSubscription {
        LedgerSubscription {
            id: Uuid::new_v4(),
            filter,
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish a change event. Never blocks.
    pub fn publish(&self, event: LedgerEvent) {
        // Broadcast to all subscribers (they filter locally)
        let _ = self.sender.send(event);
    }

    /// Get the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::{KeyHash, StrategyParams, SubjectId};

    fn create_test_event(id: RequestId, to: RequestState) -> LedgerEvent {
        let key_hash = KeyHash::parse(format!("0x{}", "11".repeat(32))).unwrap();
        let record = randmint_core::RequestRecord::new(
            id,
            SubjectId::parse("token-1").unwrap(),
            StrategyParams::new(1, key_hash),
        );
        LedgerEvent {
            id,
            from: RequestState::Created,
            to,
            record,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_filter_request() {
        let id = RequestId::new();
        let filter = SubscriptionFilter::request(id);

        assert!(filter.matches(&create_test_event(id, RequestState::RandomnessRequested)));
        assert!(!filter.matches(&create_test_event(RequestId::new(), RequestState::RandomnessRequested)));
    }

    #[test]
    fn test_filter_states() {
        let filter = SubscriptionFilter::states(vec![RequestState::RandomnessFulfilled]);
        let id = RequestId::new();

        assert!(filter.matches(&create_test_event(id, RequestState::RandomnessFulfilled)));
        assert!(!filter.matches(&create_test_event(id, RequestState::Failed)));
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_events() {
        let manager = SubscriptionManager::new();
        let id = RequestId::new();
        let mut sub = manager.subscribe(SubscriptionFilter::request(id));

        manager.publish(create_test_event(RequestId::new(), RequestState::RandomnessRequested));
        manager.publish(create_test_event(id, RequestState::RandomnessRequested));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.id, id);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let manager = SubscriptionManager::new();

        let sub = manager.subscribe(SubscriptionFilter::default());
        assert_eq!(manager.subscription_count(), 1);

        drop(sub);
        assert_eq!(manager.subscription_count(), 0);
    }
}
