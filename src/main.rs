mod actions;
mod cloud;
mod command;
mod config;
mod interceptor;
mod publisher;
mod scheduler;
mod state;
mod transport;

use actions::ScriptActions;
use anyhow::{Context, Result};
use cloud::FileApi;
use command::CommandServer;
use config::GatewayConfig;
use interceptor::{Collaborators, Interceptor};
use publisher::{publish_listener, LogSink};
use scheduler::IntervalScheduler;
use state::{load_snapshot, save_snapshot, MemoryStateStore, SNAPSHOT_FILE};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use transport::{ConnectorHub, ConnectorServer};

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = GatewayConfig::from_env()?;

    info!("Edge gateway starting: {}", config.edge_id);
    info!("  Connectors: {}", config.connector_addr);
    info!("  Commands: {}", config.command_addr);
    info!("  Data: {}", config.data_dir.display());

    // Device notifications not claimed by a pending call
    let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
    let hub = Arc::new(ConnectorHub::new(inbound_tx));

    let listener = TcpListener::bind(&config.connector_addr)
        .await
        .with_context(|| format!("bind {}", config.connector_addr))?;
    let server = ConnectorServer::new(hub.clone(), config.channel_capacity);
    tokio::spawn(async move {
        if let Err(e) = server.run(listener).await {
            error!("Connector server stopped: {:#}", e);
        }
    });

    let snapshot_path = config.data_dir.join(SNAPSHOT_FILE);
    let state = if config.clean_start {
        Arc::new(MemoryStateStore::new())
    } else {
        let snapshot = load_snapshot(&snapshot_path).await?;
        info!("Restored {} state entries", snapshot.len());
        Arc::new(MemoryStateStore::with_snapshot(snapshot, false))
    };

    // State updates drained into the log
    let (state_tx, state_rx) = mpsc::channel(config.channel_capacity);
    tokio::spawn(publish_listener(state_rx, Arc::new(LogSink)));

    let interceptor = Interceptor::new(
        &config,
        Collaborators {
            api: Arc::new(FileApi::new(&config.data_dir)),
            transport: hub,
            actions: Arc::new(ScriptActions::new()),
            state: state.clone(),
            scheduler: Arc::new(IntervalScheduler::new()),
            state_tx,
            inbound_rx,
        },
    )
    .await
    .context("interceptor bootstrap")?;

    let listener = TcpListener::bind(&config.command_addr)
        .await
        .with_context(|| format!("bind {}", config.command_addr))?;
    let commands = CommandServer::new(Arc::new(interceptor.clone()), config.channel_capacity);
    tokio::spawn(async move {
        if let Err(e) = commands.run(listener).await {
            error!("Command server stopped: {:#}", e);
        }
    });

    info!("Gateway {} running, Ctrl-C to stop", interceptor.edge_id());
    tokio::signal::ctrl_c().await?;

    interceptor.undo_all();
    if !config.clean_start {
        save_snapshot(&snapshot_path, &state.snapshot()).await?;
    }
    info!("Edge gateway stopped");
    Ok(())
}
