//! Spritestack Node Agent
//!
//! Runs on each compute node. Answers the controller's liveness probe and
//! starts one agent process per job it is handed, up to a fixed limit.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod service;

use crate::service::AgentLauncher;
use crate::service::agent::DEFAULT_AGENT_BINARY;

#[derive(Debug, Parser)]
#[command(name = "spritestack-node")]
#[command(about = "Starts CI agents on a compute node", long_about = None)]
struct NodeArgs {
    /// Address to listen on
    #[arg(long, env = "NODE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Maximum number of agents running at once
    #[arg(long, env = "AGENT_LIMIT", default_value_t = 4)]
    agent_limit: usize,

    #[arg(long, env = "AGENT_BINARY", default_value = DEFAULT_AGENT_BINARY)]
    agent_binary: String,

    /// How often to log agent usage
    #[arg(long, env = "UPDATE_INTERVAL", default_value = "5s", value_parser = humantime::parse_duration)]
    update_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spritestack_node=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = NodeArgs::parse();
    if args.agent_limit == 0 {
        bail!("agent_limit must be greater than 0");
    }
    if args.update_interval.is_zero() {
        bail!("update_interval must be greater than 0");
    }

    tracing::info!(
        "Starting Spritestack Node Agent (agent limit: {}, binary: {})",
        args.agent_limit,
        args.agent_binary
    );

    let launcher = Arc::new(AgentLauncher::new(args.agent_binary, args.agent_limit));
    let reporter = tokio::spawn(report_usage(Arc::clone(&launcher), args.update_interval));

    let app = api::create_router(launcher);

    tracing::info!("Listening on {}", args.bind);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reporter.abort();
    tracing::info!("Node agent stopped");

    Ok(())
}

/// Logs agent usage on every tick
async fn report_usage(launcher: Arc<AgentLauncher>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        tracing::info!(
            "Agents running: {}/{}",
            launcher.active(),
            launcher.limit()
        );
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
