pub mod cluster;
pub mod deploy;
pub mod health;
pub mod routing;
pub mod streams;
pub mod workspaces;

use crate::{auth::auth_middleware, state::AppState};
use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_app(state: AppState, cluster_mode: bool) -> Router {
    // Allow CORS for local development (frontend on different port)
    let cors = CorsLayer::permissive();

    let mut authed = workspaces::routes()
        .merge(routing::routes())
        .merge(deploy::routes())
        .merge(streams::routes());
    if cluster_mode {
        authed = authed.merge(cluster::routes());
    }

    Router::new()
        .merge(health::routes()) // Health routes don't need auth
        .merge(authed.layer(middleware::from_fn(auth_middleware)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
