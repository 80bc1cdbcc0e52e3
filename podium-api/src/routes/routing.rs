use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::Deserialize;

use podium_core::identity::Identity;
use podium_orchestrator::{Route, Workspace};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces/{project}/routes",
            get(list_routes).post(add_route),
        )
        .route(
            "/api/v1/workspaces/{project}/routes/{endpoint}",
            delete(remove_route),
        )
}

async fn list_routes(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Vec<Route>>> {
    let workspace = state.engine.get(&identity, &project).await?;
    Ok(Json(workspace.routes))
}

#[derive(Debug, Deserialize)]
pub struct AddRouteRequest {
    pub endpoint: String,
    pub port: u16,
    /// User routes strip their prefix unless the app is told its base path.
    #[serde(default = "default_strip")]
    pub strip_prefix: bool,
}

fn default_strip() -> bool {
    true
}

async fn add_route(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
    Json(req): Json<AddRouteRequest>,
) -> ApiResult<Json<Workspace>> {
    let route = Route {
        endpoint: req.endpoint,
        port: req.port,
        strip_prefix: req.strip_prefix,
    };
    let workspace = state.engine.add_route(&identity, &project, route).await?;
    Ok(Json(workspace))
}

async fn remove_route(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((project, endpoint)): Path<(String, String)>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state
        .engine
        .remove_route(&identity, &project, &endpoint)
        .await?;
    Ok(Json(workspace))
}
