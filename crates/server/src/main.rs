mod bootstrap;
mod health;
mod ingress;
mod outbound;

use std::time::Duration;

use anyhow::Result;
use kasir_core::config::{AppConfig, LoadOptions};

use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use kasir_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let routes = health::router(HealthState {
        db_pool: app.db_pool.clone(),
        catalog: app.catalog.clone(),
        catalog_path: app.config.engine.catalog_path.clone(),
    })
    .merge(ingress::router(app.ingress.clone()));
    health::spawn(&app.config.server.bind_address, app.config.server.health_check_port, routes)
        .await?;

    let forwarder =
        outbound::spawn(app.outbound_http.clone(), app.config.relay.outbound_url.clone(), app.outbox);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        outbound_routed = app.config.relay.outbound_url.is_some(),
        broadcast_groups = app.config.relay.broadcast_groups.len(),
        "kasir-server started"
    );

    tokio::select! {
        result = app.relay.start() => result?,
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "kasir-server stopping");

    drop(app.relay);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let journal_writer = app.journal_writer;
    let flushed = tokio::time::timeout(grace, async move {
        let _ = forwarder.await;
        let _ = journal_writer.await;
    })
    .await;
    if flushed.is_err() {
        tracing::warn!(
            event_name = "system.server.flush_abandoned",
            correlation_id = "shutdown",
            "pending replies or journal entries were not flushed before the shutdown deadline"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
