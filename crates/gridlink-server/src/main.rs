//! # Gridlink
//!
//! Realtime sample gateway: moves samples between nodes along configured
//! paths.
//!
//! ## Usage
//!
//! ```bash
//! # Run with the first configuration found in the default locations
//! gridlink
//!
//! # Run with a custom config
//! gridlink --config /path/to/gridlink.toml
//!
//! # Validate a config and list node types
//! gridlink --config gridlink.toml --check
//! gridlink --list-nodes
//! ```

mod config;
mod handlers;
mod metrics;
mod supernode;

use anyhow::{Context as _, Result};
use clap::Parser;
use gridlink_nodes::NodeRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::handlers::AppState;
use crate::supernode::SuperNode;

#[derive(Debug, Parser)]
#[command(name = "gridlink", version, about = "Realtime sample gateway")]
struct Args {
    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Build and prepare everything, then exit.
    #[arg(long)]
    check: bool,

    /// List the available node types and exit.
    #[arg(long)]
    list_nodes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridlink=info,gridlink_core=info,gridlink_nodes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let registry = NodeRegistry::with_builtin_nodes();

    if args.list_nodes {
        for descriptor in registry.iter() {
            println!("{:<10} {}", descriptor.name, descriptor.description);
        }
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let ctx = config.engine.context();
    let supernode = Arc::new(
        SuperNode::build(&ctx, &registry, &config.nodes, &config.paths).context("Failed to build nodes")?,
    );

    if args.check {
        let failed: Vec<_> = supernode.paths().into_iter().filter(|p| p.error.is_some()).collect();
        for path in &failed {
            error!(path = %path.name, error = ?path.error, "Path check failed");
        }
        anyhow::ensure!(failed.is_empty(), "{} path(s) failed to prepare", failed.len());
        info!("Configuration is valid");
        return Ok(());
    }

    info!("Starting Gridlink");
    supernode.start().await.context("Failed to start nodes")?;

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        tasks.push(tokio::spawn(metrics::publish(
            Arc::clone(&supernode),
            ctx.stats_interval(),
            cancel.clone(),
        )));
    }

    if config.http.enabled {
        let state = Arc::new(AppState::new(Arc::clone(&supernode)));
        let http = config.http.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = handlers::run_server(http, state, cancel).await {
                error!("HTTP server failed: {:#}", e);
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    cancel.cancel();
    supernode.stop().await;
    for task in tasks {
        let _ = task.await;
    }

    info!("Gridlink stopped");
    Ok(())
}
