use std::sync::Arc;

use podium_orchestrator::{ClusterController, OrchestratorConfig, WorkspaceEngine};
use podium_runtime::RuntimeClient;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkspaceEngine>,
    pub cluster: Arc<ClusterController>,
}

impl AppState {
    pub fn new(runtime: RuntimeClient, config: OrchestratorConfig) -> Self {
        Self {
            engine: Arc::new(WorkspaceEngine::new(runtime.clone(), config.clone())),
            cluster: Arc::new(ClusterController::new(runtime, config)),
        }
    }
}
