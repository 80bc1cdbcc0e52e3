use anyhow::Result;
use tracing::info;

use podium_api::{create_app, AppState, Config};
use podium_orchestrator::OrchestratorConfig;
use podium_runtime::RuntimeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("podium_api=debug,podium_orchestrator=debug,podium_runtime=debug,tower_http=debug")
        .init();

    info!("Starting podium-api service...");

    let config = Config::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();
    info!(
        "Configuration loaded: bind_addr={}, cluster_mode={}, public_base={}",
        config.bind_addr, config.cluster_mode, orchestrator_config.public_base
    );

    let runtime = RuntimeClient::connect()?;
    let state = AppState::new(runtime, orchestrator_config);
    let app = create_app(state, config.cluster_mode);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
