//! Application state.

use std::sync::Arc;

use randmint_oracle::MockCoordinator;
use randmint_workflow::Workflow;

use crate::config::NodeConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The request/fulfill workflow.
    pub workflow: Arc<Workflow>,

    /// Oracle stand-in receiving submissions.
    pub coordinator: Arc<MockCoordinator>,

    /// Node configuration.
    pub config: Arc<NodeConfig>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: NodeConfig) -> Self {
        let (workflow, coordinator) = Workflow::with_mock(
            config.initial_funds,
            config.mock_config(),
            config.coordinator_config(),
        );

        Self {
            workflow: Arc::new(workflow),
            coordinator,
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(NodeConfig::default())
    }
}
