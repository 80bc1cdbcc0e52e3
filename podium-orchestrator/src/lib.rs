//! Workspace orchestration engine.
//!
//! The engine provisions per-user, per-project workspaces as Docker
//! containers (or Swarm services in clustered mode) and publishes them
//! through Traefik label rules. There is no external metadata store: the
//! label set of the backing runtime object *is* the workspace record, and
//! every read goes through the codec in [`labels`] so that an unmanaged or
//! malformed object is simply excluded rather than crashing a caller.

pub mod cluster;
pub mod config;
pub mod deploy;
pub mod labels;
pub mod lifecycle;
pub mod routes;
pub mod workspace;

pub use cluster::ClusterController;
pub use config::OrchestratorConfig;
pub use lifecycle::{InitOptions, WorkspaceEngine};
pub use workspace::{
    AppRuntime, DeploymentSource, Preset, ResourceLimits, Route, RunState, Workspace,
    WorkspaceKey, WorkspaceMeta,
};
