mod bootstrap;
mod health;
mod pipeline;
mod sweep;

use anyhow::Result;
use mudey_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use mudey_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let sweep_handle = sweep::spawn(
        app.dispatcher.clone(),
        app.pipeline.clone(),
        app.config.dispatch.sweep_interval_secs,
    );

    tracing::info!(
        event_name = "system.server.channel_transport_mode",
        transport_mode = if app.channel_runner.is_noop_transport() { "noop" } else { "live" },
        correlation_id = "bootstrap",
        "channel runner transport mode initialized"
    );

    app.channel_runner.start().await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "mudey-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "mudey-server stopping"
    );

    sweep_handle.abort();
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
