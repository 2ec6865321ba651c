//! # Randmint Ledger
//!
//! Durable record of randomness requests with per-record atomic transitions.

pub mod audit;
pub mod store;
pub mod subscription;

pub use audit::LedgerSnapshot;
pub use store::{InMemoryLedger, RequestLedger};
pub use subscription::{LedgerEvent, LedgerSubscription, SubscriptionFilter, SubscriptionManager};
