use std::sync::Arc;

use anyhow::Context;

use artifacts_runner::config::RunnerConfig;
use artifacts_runner::game::{ActionExecutor, Catalog, GameClient};
use artifacts_runner::routes::control_routes;
use artifacts_runner::store::{JsonFileStore, QueueStore};
use artifacts_runner::worker::Fleet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(RunnerConfig::from_env().context("loading configuration")?);

    eprintln!("⚔️  Artifacts runner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", config.api_url);
    eprintln!("   State: {}", config.state_dir.display());
    eprintln!("   Control API: http://0.0.0.0:{}/api/characters", config.http_port);

    let client = Arc::new(GameClient::new(&config.api_url, &config.api_token)?);
    let executor: Arc<dyn ActionExecutor> = client.clone();
    let catalog: Arc<dyn Catalog> = client;
    let store: Arc<dyn QueueStore> = Arc::new(JsonFileStore::new(&config.state_dir));

    let fleet = Arc::new(Fleet::new(executor, catalog, Some(store), config.clone()));
    for character in &config.characters {
        fleet
            .spawn(character)
            .await
            .with_context(|| format!("starting worker for {}", character.name))?;
        eprintln!("   Character: {} ({:?})", character.name, character.role);
    }

    let app = control_routes(fleet.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("binding control port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "Control server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await
        .context("control server")?;

    tracing::info!("Shutting down character workers");
    fleet.shutdown().await;
    Ok(())
}
