//! Node Tracker
//!
//! Main entry point for the tracker service.
//! Keeps the node registry and transaction ledger in memory, serves them over
//! HTTP and streams graph snapshots to observers. Nothing survives a restart.

use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracker_core::Tracker;
use tracker_server::{HttpTrackerServer, TrackerContext};

mod config;

use config::TrackerConfig;

/// Distributed ledger node tracker
#[derive(Parser, Debug)]
#[command(name = "node-tracker")]
#[command(about = "Tracks worker nodes and streams their transaction graph", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// Heartbeat interval in seconds
    #[arg(long)]
    heartbeat_interval: Option<u64>,

    /// Queued events per SSE observer
    #[arg(long)]
    subscriber_buffer: Option<usize>,

    /// Highest node id accepted from clients
    #[arg(long)]
    max_node_id: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// File config (or defaults) with command line flags on top
    fn into_config(self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::load(path)?,
            None => TrackerConfig::default(),
        };

        if let Some(http_addr) = self.http_addr {
            config.http_addr = http_addr;
        }
        if let Some(secs) = self.heartbeat_interval {
            config.heartbeat_interval_secs = secs;
        }
        if let Some(buffer) = self.subscriber_buffer {
            config.subscriber_buffer = buffer;
        }
        if let Some(max_node_id) = self.max_node_id {
            config.max_node_id = max_node_id;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(config).await
}

async fn run(config: TrackerConfig) -> Result<()> {
    tracing::info!("Starting node tracker");
    tracing::info!("  HTTP: {}", config.http_addr);
    tracing::info!("  Heartbeat: {}s", config.heartbeat_interval_secs);
    tracing::info!("  Subscriber buffer: {}", config.subscriber_buffer);
    tracing::info!("  Max node id: {}", config.max_node_id);

    let tracker = Arc::new(Tracker::with_max_node_id(config.max_node_id));
    tracker.start_heartbeat(Some(Duration::from_secs(config.heartbeat_interval_secs)));

    let context = Arc::new(TrackerContext::new(
        tracker.clone(),
        config.server_config(),
    ));

    // Start HTTP server
    let mut http_server = tokio::spawn(HttpTrackerServer::new(context).run());

    tracing::info!("Tracker running. Press Ctrl+C to stop.");

    // Wait for shutdown signal or server exit
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            http_server.abort();
            signal.map_err(anyhow::Error::from)
        }
        result = &mut http_server => {
            tracing::error!("HTTP server exited");
            result.map_err(anyhow::Error::from).and_then(|served| served)
        }
    };

    tracker.stop_heartbeat();
    let status = tracker.status();
    tracing::info!(
        "Tracker stopped ({} nodes registered, {} running, {} observers)",
        status.registered,
        status.running,
        tracker.hub().len()
    );

    outcome
}
