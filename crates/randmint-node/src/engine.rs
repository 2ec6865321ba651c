//! Background completion engine.
//!
//! Completes every fulfilled request, so results land even when nobody is
//! waiting on them any more.

use std::sync::Arc;

use randmint_core::RequestState;
use randmint_ledger::RequestLedger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// The background engine.
pub struct Engine {
    state: AppState,
}

impl Engine {
    /// Create a new engine.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.state.config.engine_interval;
        info!(interval_ms = interval.as_millis() as u64, "🔧 Engine started");

        loop {
            self.complete_fulfilled().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Engine stopped");
    }

    /// Complete every request in `RandomnessFulfilled`. Returns how many
    /// completed on this pass.
    pub async fn complete_fulfilled(&self) -> usize {
        let workflow = &self.state.workflow;

        let fulfilled = match workflow
            .ledger()
            .list_in_state(RequestState::RandomnessFulfilled)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not list fulfilled requests");
                return 0;
            }
        };

        let mut completed = 0;
        for record in fulfilled {
            match workflow.finalize(record.id).await {
                Ok(artifact) => {
                    completed += 1;
                    info!(request_id = %record.id, subject = %record.subject, digest = %artifact.digest, "✅ Engine completed request");
                }
                Err(e) if e.is_benign() => {
                    debug!(request_id = %record.id, error = %e, "Skipped request");
                }
                Err(e) if e.is_invariant_violation() => {
                    error!(request_id = %record.id, error = %e, "Completion invariant violated");
                }
                Err(e) => {
                    warn!(request_id = %record.id, error = %e, "Completion failed");
                }
            }
        }

        completed
    }
}
