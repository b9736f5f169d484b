//! Spritestack Controller
//!
//! Admission controller that moves CI jobs from an upstream queue onto a
//! pool of compute nodes.
//!
//! Architecture:
//! - Configuration: Flags with environment fallbacks
//! - Repositories: HTTP communication with the upstream queue
//! - Ledger: Local record of jobs in flight
//! - Services: Health gating, agent dispatch and failure reporting
//! - Scheduler: Queue polling and batch reservation
//!
//! The controller registers its stack, polls the queue, reserves what it
//! finds and starts one agent per reserved job. On SIGINT or SIGTERM it
//! stops polling and deregisters the stack.

mod config;
mod ledger;
mod node;
mod repository;
mod scheduler;
mod service;
mod shutdown;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use spritestack_client::QueueClient;
use spritestack_core::dto::stack::RegisterStack;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ControllerArgs, NodeSelection, TransportKind};
use crate::ledger::{JobLedger, Ledger};
use crate::node::{
    CommandTransport, HttpAgentTransport, NodeSelector, NodeTransport, RoundRobin, SingleNode,
};
use crate::repository::{HttpQueueRepository, QueueRepository};
use crate::scheduler::{PollError, QueuePoller, ReservationCoordinator};
use crate::service::{DispatchEngine, FailureReporter, HttpHealthGate};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spritestack_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Spritestack Controller");

    let config = Config::from_args(ControllerArgs::parse())?;
    info!(
        "Loaded configuration: stack_key={}, queue={}, api_url={}, nodes={}",
        config.stack_key,
        config.queue,
        config.api_url,
        config.nodes.len()
    );

    let client = QueueClient::new(config.api_url.clone(), config.agent_token.clone());

    info!("Registering stack {}", config.stack_key);
    register_with_retry(&client, &config).await?;
    info!("Stack registered successfully");

    let shutdown = shutdown::install_shutdown_handler()?;
    let poller = build_poller(&config, client.clone())?;

    info!(
        "Controller initialized (poll interval: {:?}, max concurrent dispatches: {})",
        config.poll_interval, config.max_concurrent_dispatches
    );

    let mut handle = tokio::spawn({
        let cancel = shutdown.graceful().clone();
        async move { poller.run(cancel).await }
    });

    shutdown.graceful().cancelled().await;
    info!("Shutting down, draining in-flight dispatches");

    tokio::select! {
        result = &mut handle => match result {
            Ok(Err(PollError::Cancelled)) => {}
            Ok(Err(e)) => error!("Poller stopped: {}", e),
            Err(e) => error!("Poller task failed: {}", e),
        },
        _ = shutdown.forced().cancelled() => {
            warn!("Abandoning in-flight dispatches; their reservations lapse upstream");
            handle.abort();
        }
    }

    client
        .deregister_stack(&config.stack_key)
        .await
        .with_context(|| format!("Failed to deregister stack {}", config.stack_key))?;
    info!("Stack {} deregistered", config.stack_key);

    Ok(())
}

/// Wires the control loop together from configuration
fn build_poller(config: &Config, client: QueueClient) -> Result<QueuePoller> {
    let queue: Arc<dyn QueueRepository> = Arc::new(HttpQueueRepository::new(
        client,
        config.stack_key.clone(),
        config.queue.clone(),
        config.page_size,
    ));

    let store = Arc::new(Ledger::new(config.ledger_max_entries));
    info!(
        "Job ledger: max {} entries, ttl {:?}",
        store.max_entries(),
        config.ledger_ttl
    );
    let ledger = Arc::new(JobLedger::new(store, config.ledger_ttl));

    let selector: Arc<dyn NodeSelector> = match config.node_selection {
        NodeSelection::Single => {
            let node = config
                .nodes
                .first()
                .cloned()
                .context("No compute node configured")?;
            Arc::new(SingleNode::new(node))
        }
        NodeSelection::RoundRobin => Arc::new(RoundRobin::new(config.nodes.clone())),
    };
    let names: Vec<&str> = selector.nodes().iter().map(|n| n.name.as_str()).collect();
    info!("Dispatching to node(s): {}", names.join(", "));

    let transport: Arc<dyn NodeTransport> = match config.transport {
        TransportKind::Http => Arc::new(HttpAgentTransport::new(config.health_port.clone())),
        TransportKind::Command => Arc::new(
            CommandTransport::from_template(&config.agent_command)
                .context("Invalid agent command")?,
        ),
    };

    let health = Arc::new(
        HttpHealthGate::new(config.health_timeout).context("Failed to build health client")?,
    );

    let dispatcher = Arc::new(DispatchEngine::new(
        selector,
        health,
        transport,
        FailureReporter::new(Arc::clone(&queue), Arc::clone(&ledger)),
        Arc::clone(&ledger),
        config.retry_policy(),
        config.health_port.clone(),
    ));

    let coordinator = ReservationCoordinator::new(
        Arc::clone(&queue),
        Arc::clone(&ledger),
        dispatcher,
        config.reservation_expiry,
        config.max_concurrent_dispatches,
    );

    Ok(QueuePoller::new(
        queue,
        coordinator,
        ledger,
        config.queue.clone(),
        config.poll_interval,
    ))
}

/// Registers the stack with retry logic and exponential backoff
///
/// The upstream may be briefly unreachable when the controller starts.
async fn register_with_retry(client: &QueueClient, config: &Config) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let request = RegisterStack::custom(&config.stack_key, &config.queue);
    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.register_stack(&request).await {
            Ok(stack) => {
                if attempt > 1 {
                    info!(
                        "Registered stack {} after {} attempt(s)",
                        stack.key, attempt
                    );
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES || e.is_client_error() {
                    error!("Failed to register stack after {} attempt(s)", attempt);
                    return Err(anyhow::anyhow!("Failed to register stack: {}", e));
                }

                warn!(
                    "Failed to register stack (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
