//! Request records and the typed transitions that mutate them.
//!
//! A [`RequestRecord`] is the durable trace of one randomness request. It is
//! only ever changed by applying a [`Transition`], which checks the state
//! machine before touching any field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::{RandmintError, Result};
use crate::types::{Randomness, RequestId, RequestState, StrategyParams, SubjectId};

/// One randomness request from creation to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Unique identifier for this request.
    pub id: RequestId,

    /// The entity the randomness is for.
    pub subject: SubjectId,

    /// Current state.
    pub state: RequestState,

    /// Delivered randomness, absent until fulfillment.
    pub randomness: Option<Randomness>,

    /// Parameters chosen at request time.
    pub params: StrategyParams,

    /// Result of completion.
    pub artifact: Option<Artifact>,

    /// Reason recorded when the request failed.
    pub failure: Option<String>,

    /// Timestamp when the record was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the oracle acknowledged the request.
    pub requested_at: Option<DateTime<Utc>>,

    /// Timestamp when randomness was delivered.
    pub fulfilled_at: Option<DateTime<Utc>>,

    /// Timestamp when completion finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Append-only audit trail of state changes.
    pub history: Vec<TransitionEvent>,
}

/// A single state change in a record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub from: RequestState,
    pub to: RequestState,
    pub at: DateTime<Utc>,
}

/// A requested move, carrying the fields it sets.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The oracle acknowledged the submission.
    Requested,
    /// The oracle delivered randomness.
    Fulfill { randomness: Randomness },
    /// The dependent computation finished.
    Complete { artifact: Artifact },
    /// The request was rejected or cancelled.
    Fail { reason: String },
}

impl Transition {
    /// The state this transition moves to.
    pub fn target(&self) -> RequestState {
        match self {
            Transition::Requested => RequestState::RandomnessRequested,
            Transition::Fulfill { .. } => RequestState::RandomnessFulfilled,
            Transition::Complete { .. } => RequestState::Completed,
            Transition::Fail { .. } => RequestState::Failed,
        }
    }
}

impl RequestRecord {
    /// Create a record in the `Created` state.
    pub fn new(id: RequestId, subject: SubjectId, params: StrategyParams) -> Self {
        Self {
            id,
            subject,
            state: RequestState::Created,
            randomness: None,
            params,
            artifact: None,
            failure: None,
            created_at: Utc::now(),
            requested_at: None,
            fulfilled_at: None,
            completed_at: None,
            history: Vec::new(),
        }
    }

    /// Decide whether `transition` may be applied from the current state.
    ///
    /// A writer that finds the record already at (or past) its target, or
    /// failed underneath it, lost a race and gets `AlreadyTransitioned`. A
    /// `Fail` that finds the randomness already delivered lost to that
    /// delivery. Anything else that is not a legal move is `InvalidTransition`.
    pub fn check(&self, transition: &Transition) -> Result<()> {
        let to = transition.target();

        if self.state.can_transition_to(to) {
            return Ok(());
        }

        let lost_race = match to {
            RequestState::Failed => {
                self.state == RequestState::Failed
                    || self.state.rank() > RequestState::RandomnessRequested.rank()
            }
            _ => self.state == RequestState::Failed || self.state.rank() >= to.rank(),
        };

        if lost_race {
            Err(RandmintError::AlreadyTransitioned {
                id: self.id,
                current: self.state,
            })
        } else {
            Err(RandmintError::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            })
        }
    }

    /// Apply a transition, enforcing the state machine.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        self.check(&transition)?;

        let from = self.state;
        let to = transition.target();
        let now = Utc::now();

        match transition {
            Transition::Requested => {
                self.requested_at = Some(now);
            }
            Transition::Fulfill { randomness } => {
                if self.randomness.is_some() {
                    return Err(RandmintError::Internal(format!(
                        "randomness already recorded for request {}",
                        self.id
                    )));
                }
                self.randomness = Some(randomness);
                self.fulfilled_at = Some(now);
            }
            Transition::Complete { artifact } => {
                if self.randomness.is_none() {
                    return Err(RandmintError::MissingRandomness { id: self.id });
                }
                self.artifact = Some(artifact);
                self.completed_at = Some(now);
            }
            Transition::Fail { reason } => {
                self.failure = Some(reason);
            }
        }

        self.state = to;
        self.history.push(TransitionEvent { from, to, at: now });

        Ok(())
    }
}
