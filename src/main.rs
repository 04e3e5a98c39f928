use anyhow::{Context, Result};
use audit_gateway::config::{LoggingSettings, Settings};
use audit_gateway::Application;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.is_json() {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    let settings = Settings::new().context("failed to load configuration")?;
    init_tracing(&settings.logging);

    info!(
        environment = %settings.application.environment,
        "Starting JSON-RPC audit gateway"
    );

    let app = Application::from_settings(settings).await?;
    app.run().await?;

    Ok(())
}
