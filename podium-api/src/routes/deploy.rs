use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};

use podium_core::identity::Identity;
use podium_orchestrator::Workspace;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/workspaces/{project}/deploy", post(redeploy))
}

/// Pull the workspace's repository and restart it on the new commit.
async fn redeploy(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state.engine.redeploy(&identity, &project).await?;
    Ok(Json(workspace))
}
