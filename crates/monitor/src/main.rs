//! network-monitor binary

use monitor::{Config, MonitorEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    let json = config.logging.format.as_deref() == Some("json");
    common::logging::init_with_level(level, json);

    tracing::info!("network-monitor starting");

    let engine = MonitorEngine::new(&config.engine);

    let targets = config.valid_targets();
    tracing::info!("Scheduling {} targets", targets.len());
    engine.apply_targets(targets);

    // Log every status transition until shutdown.
    let mut events = engine.publisher().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(t) => {
                    tracing::info!(id = t.target, from = %t.from, to = %t.to, "Status transition");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Transition log fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    engine.shutdown();

    Ok(())
}
