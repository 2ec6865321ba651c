//! # Randmint Core
//!
//! Core primitives for the randomness request/fulfill workflow.
//!
//! This crate provides the fundamental building blocks:
//! - [`RequestRecord`] - Durable trace of one randomness request
//! - [`Transition`] - Typed, state-machine-checked mutation of a record
//! - [`Artifact`] - Result of the dependent computation
//! - [`BackoffPolicy`] - Bounded exponential backoff for polling and retries
//! - [`RandmintError`] - Error taxonomy

pub mod artifact;
pub mod backoff;
pub mod error;
pub mod record;
pub mod types;

// Re-exports for convenience
pub use artifact::{expand, Artifact, ArtifactComputer, DigestComputer};
pub use backoff::{Backoff, BackoffPolicy};
pub use error::{ErrorClass, RandmintError, Result};
pub use record::{RequestRecord, Transition, TransitionEvent};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::artifact::{Artifact, ArtifactComputer, DigestComputer};
    pub use crate::backoff::BackoffPolicy;
    pub use crate::error::{RandmintError, Result};
    pub use crate::record::{RequestRecord, Transition};
    pub use crate::types::{KeyHash, Randomness, RequestId, RequestState, StrategyParams, SubjectId};
}
