mod bootstrap;
mod health;

use anyhow::Result;
use mailbrief_core::config::{AppConfig, LoadOptions};
use mailbrief_discord::commands::command_definitions;
use mailbrief_discord::pagination::DEFAULT_SWEEP_PERIOD;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use mailbrief_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before anything that might log.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    match app.delivery.register_commands(&command_definitions()).await {
        Ok(registered) => tracing::info!(
            event_name = "system.server.commands_registered",
            correlation_id = "bootstrap",
            registered,
            "slash commands registered"
        ),
        Err(error) => tracing::warn!(
            event_name = "system.server.commands_registration_failed",
            correlation_id = "bootstrap",
            error = %error,
            "slash command registration failed; existing registration stays in place"
        ),
    }

    let subscription_state = app.subscription.watch_state();
    let subscription = app.subscription.clone().spawn();
    let sweeper = app.pagination.spawn_sweeper(app.delivery.clone(), DEFAULT_SWEEP_PERIOD);

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.sessions.clone(), subscription_state),
    )
    .await?;

    let gateway = app.gateway;
    let gateway_task = tokio::spawn(async move { gateway.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "mailbrief-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "mailbrief-server stopping"
    );

    gateway_task.abort();
    subscription.abort();
    sweeper.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
