//! Clustered endpoints, mounted only when the service runs in cluster mode.
//! They mirror the single-host surface minus the operations a scheduler
//! makes meaningless (start/stop: a service is always reconciled to running).

use std::convert::Infallible;

use crate::routes::workspaces::CreateWorkspaceRequest;
use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use podium_core::identity::Identity;
use podium_orchestrator::Workspace;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/cluster/workspaces",
            get(list_workspaces).post(create_workspace),
        )
        .route(
            "/api/v1/cluster/workspaces/{project}",
            get(get_workspace).delete(destroy_workspace),
        )
        .route(
            "/api/v1/cluster/workspaces/{project}/restart",
            post(restart_workspace),
        )
        .route(
            "/api/v1/cluster/workspaces/{project}/logs",
            get(stream_logs),
        )
}

async fn create_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    let options = req.into_options()?;
    let workspace = state.cluster.init(&identity, options).await?;
    Ok(Json(workspace))
}

async fn list_workspaces(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Workspace>>> {
    let workspaces = state.cluster.list_mine(&identity).await?;
    Ok(Json(workspaces))
}

async fn get_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.cluster.get(&identity, &project).await?;
    Ok(Json(workspace))
}

async fn destroy_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.cluster.destroy(&identity, &project).await?;
    Ok(Json(serde_json::json!({ "message": "Workspace destroyed" })))
}

async fn restart_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.cluster.restart(&identity, &project).await?;
    Ok(Json(workspace))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_follow")]
    follow: bool,
    tail: Option<u32>,
}

fn default_follow() -> bool {
    true
}

async fn stream_logs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let lines = state
        .cluster
        .stream_logs(&identity, &project, query.follow, query.tail.or(Some(100)))
        .await?;
    let events = lines.map(|line| Ok(Event::default().event(line.stream.as_str()).data(line.line)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
