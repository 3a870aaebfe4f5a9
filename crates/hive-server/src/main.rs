//! hive-server binary entry point

use anyhow::Result;
use clap::Parser;
use hive_proto::models::Position;
use tracing::info;

use hive_server::{logging, sim, Cli, Hub, HubConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = HubConfig::load(cli.config.as_deref(), &cli.overrides())?;

    logging::init(&config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting hive-server");

    // Build the hub
    let hub = Hub::build(config).await?;
    let reaper = hub.spawn_reaper();

    let simulation = hub
        .config()
        .simulate
        .clone()
        .map(|id| sim::spawn(&hub, &id, Position::point(0.0, 0.0, 0.0)));

    info!("hub ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    hub.shutdown();
    reaper.await?;
    if let Some(simulation) = simulation {
        simulation.node.abort();
        simulation.vehicle.abort();
    }
    info!("hive-server stopped");
    Ok(())
}
