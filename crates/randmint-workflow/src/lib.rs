//! # Randmint Workflow
//!
//! Completion and waiting on top of the ledger and oracle crates.
//!
//! - [`CompletionEngine`] - idempotent, exactly-once completion
//! - [`WaitCoordinator`] - event-driven waiting with bounded backoff
//! - [`Workflow`] - the caller-facing facade

pub mod completion;
pub mod coordinator;
pub mod workflow;

pub use completion::CompletionEngine;
pub use coordinator::{CoordinatorConfig, WaitCoordinator, WaitOutcome};
pub use workflow::{Workflow, CANCELLED_REASON};
