use std::time::Duration;

use identity_service::bootstrap;
use identity_service::config::Config;
use identity_service::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing("identity_service=debug");

    tracing::info!(
        service = "identity-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        base_url = %config.app.base_url,
        default_role = %config.app.default_role,
        providers = config.providers.len(),
        queue_capacity = config.notifications.queue_capacity,
        "Configuration loaded"
    );

    let application = bootstrap::build(&config).await?;
    let purge = bootstrap::spawn_token_purge(
        application.tokens,
        Duration::from_secs(config.app.purge_interval_seconds),
    );

    tracing::info!("Identity service ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    purge.abort();
    application.worker.shutdown().await;

    Ok(())
}
