use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use podium_core::error::PodiumError;
use podium_core::identity::Identity;
use podium_orchestrator::{DeploymentSource, InitOptions, Preset, Workspace};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces",
            get(list_workspaces).post(create_workspace),
        )
        .route(
            "/api/v1/workspaces/{project}",
            get(get_workspace).delete(destroy_workspace),
        )
        .route("/api/v1/workspaces/{project}/start", post(start_workspace))
        .route("/api/v1/workspaces/{project}/stop", post(stop_workspace))
        .route(
            "/api/v1/workspaces/{project}/restart",
            post(restart_workspace),
        )
        .route("/api/v1/workspaces/{project}/wipe", post(wipe_workspace))
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub project: String,
    pub preset: String,
    pub runtime: Option<String>,
    pub cpus: Option<f64>,
    pub mem_mb: Option<u64>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub subdir: Option<String>,
    pub start_command: Option<String>,
}

impl CreateWorkspaceRequest {
    pub fn into_options(self) -> Result<InitOptions, PodiumError> {
        let preset = Preset::from_label(&self.preset, self.runtime.as_deref()).ok_or_else(|| {
            PodiumError::InvalidArgument(format!("Unknown preset '{}'", self.preset))
        })?;
        let deployment = self.repo_url.map(|repo_url| DeploymentSource {
            repo_url,
            branch: self.branch,
            subdir: self.subdir,
            start_command: self.start_command,
            last_commit: None,
        });
        Ok(InitOptions {
            project: self.project,
            preset,
            cpus: self.cpus,
            mem_mb: self.mem_mb,
            deployment,
        })
    }
}

async fn create_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    let options = req.into_options()?;
    let workspace = state.engine.init(&identity, options).await?;
    Ok(Json(workspace))
}

async fn list_workspaces(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Workspace>>> {
    let workspaces = state.engine.list_mine(&identity).await?;
    Ok(Json(workspaces))
}

async fn get_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.get(&identity, &project).await?;
    Ok(Json(workspace))
}

async fn destroy_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.destroy(&identity, &project).await?;
    Ok(Json(serde_json::json!({ "message": "Workspace destroyed" })))
}

async fn start_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.start(&identity, &project).await?;
    Ok(Json(workspace))
}

async fn stop_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.stop(&identity, &project).await?;
    Ok(Json(workspace))
}

async fn restart_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.restart(&identity, &project).await?;
    Ok(Json(workspace))
}

async fn wipe_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.wipe(&identity, &project).await?;
    Ok(Json(workspace))
}
