//! Controller configuration
//!
//! Command-line flags with environment fallbacks, resolved into a validated
//! [`Config`]. Durations are humantime strings such as `1s` or `10m`.

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use spritestack_client::DEFAULT_API_URL;
use spritestack_core::domain::node::ComputeNode;
use std::time::Duration;

use crate::node::transport::DEFAULT_AGENT_COMMAND;
use crate::service::RetryPolicy;

/// How reserved jobs are assigned to compute nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeSelection {
    /// Every job goes to the first configured node
    Single,
    /// Jobs rotate across all configured nodes
    RoundRobin,
}

/// How the agent is started on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// POST to the node agent's job endpoint
    Http,
    /// Run a local command template
    Command,
}

#[derive(Debug, Parser)]
#[command(name = "spritestack-controller")]
#[command(about = "Admits queued CI jobs onto compute nodes", long_about = None)]
pub struct ControllerArgs {
    /// Agent token used to authenticate against the upstream queue
    #[arg(long, env = "BUILDKITE_AGENT_TOKEN", hide_env_values = true)]
    pub agent_token: String,

    /// Stack key registered with the upstream queue
    #[arg(long, env = "STACK_KEY", default_value = "bk-sprites")]
    pub stack_key: String,

    /// Queue to poll for scheduled jobs
    #[arg(long, env = "QUEUE", default_value = "default")]
    pub queue: String,

    #[arg(long, env = "POLL_INTERVAL", default_value = "1s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,

    #[arg(long, env = "BUILDKITE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Jobs requested per page
    #[arg(long, env = "PAGE_SIZE", default_value_t = 50)]
    pub page_size: u32,

    /// Reservation lease handed to the upstream queue
    #[arg(long, env = "RESERVATION_EXPIRY", default_value = "30s", value_parser = humantime::parse_duration)]
    pub reservation_expiry: Duration,

    /// Ledger capacity, 0 for unbounded
    #[arg(long, env = "LEDGER_MAX_ENTRIES", default_value_t = 1000)]
    pub ledger_max_entries: usize,

    #[arg(long, env = "LEDGER_TTL", default_value = "10m", value_parser = humantime::parse_duration)]
    pub ledger_ttl: Duration,

    #[arg(long, env = "MAX_CONCURRENT_DISPATCHES", default_value_t = 8)]
    pub max_concurrent_dispatches: usize,

    #[arg(long, env = "DISPATCH_MAX_ATTEMPTS", default_value_t = 3)]
    pub dispatch_max_attempts: u32,

    /// Delay before the second start attempt, doubled for each one after
    #[arg(long, env = "DISPATCH_BASE_DELAY", default_value = "2s", value_parser = humantime::parse_duration)]
    pub dispatch_base_delay: Duration,

    /// Deadline for a single start attempt
    #[arg(long, env = "DISPATCH_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub dispatch_timeout: Duration,

    #[arg(long, env = "HEALTH_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub health_timeout: Duration,

    /// Port of the node agent, used for the liveness probe and job starts
    #[arg(long, env = "HEALTH_PORT", default_value = "8080")]
    pub health_port: String,

    /// Compute node as `name=address`, repeatable
    #[arg(
        long = "node",
        env = "NODES",
        value_delimiter = ',',
        default_value = "bk-test-1=localhost"
    )]
    pub nodes: Vec<ComputeNode>,

    #[arg(long, env = "NODE_SELECTION", value_enum, default_value_t = NodeSelection::Single)]
    pub node_selection: NodeSelection,

    #[arg(long, env = "DISPATCH_TRANSPORT", value_enum, default_value_t = TransportKind::Http)]
    pub transport: TransportKind,

    /// Command template for the command transport; supports {node}, {address} and {job}
    #[arg(long, env = "AGENT_COMMAND", default_value = DEFAULT_AGENT_COMMAND)]
    pub agent_command: String,
}

/// Resolved controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_token: String,
    pub stack_key: String,
    pub queue: String,
    pub api_url: String,
    pub poll_interval: Duration,
    pub page_size: u32,
    pub reservation_expiry: Duration,
    pub ledger_max_entries: usize,
    pub ledger_ttl: Duration,
    pub max_concurrent_dispatches: usize,
    pub dispatch_max_attempts: u32,
    pub dispatch_base_delay: Duration,
    pub dispatch_timeout: Duration,
    pub health_timeout: Duration,
    pub health_port: String,
    pub nodes: Vec<ComputeNode>,
    pub node_selection: NodeSelection,
    pub transport: TransportKind,
    pub agent_command: String,
}

impl Config {
    /// Builds and validates a configuration from parsed flags
    pub fn from_args(args: ControllerArgs) -> Result<Self> {
        let config = Self {
            agent_token: args.agent_token,
            stack_key: args.stack_key,
            queue: args.queue,
            api_url: args.api_url.trim_end_matches('/').to_string(),
            poll_interval: args.poll_interval,
            page_size: args.page_size,
            reservation_expiry: args.reservation_expiry,
            ledger_max_entries: args.ledger_max_entries,
            ledger_ttl: args.ledger_ttl,
            max_concurrent_dispatches: args.max_concurrent_dispatches,
            dispatch_max_attempts: args.dispatch_max_attempts,
            dispatch_base_delay: args.dispatch_base_delay,
            dispatch_timeout: args.dispatch_timeout,
            health_timeout: args.health_timeout,
            health_port: args.health_port,
            nodes: args.nodes,
            node_selection: args.node_selection,
            transport: args.transport,
            agent_command: args.agent_command,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent_token.trim().is_empty() {
            bail!("agent_token cannot be empty");
        }

        if self.stack_key.is_empty() {
            bail!("stack_key cannot be empty");
        }

        if self.queue.is_empty() {
            bail!("queue cannot be empty");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!("api_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.page_size == 0 {
            bail!("page_size must be greater than 0");
        }

        if self.reservation_expiry < Duration::from_secs(1) {
            bail!("reservation_expiry must be at least 1s");
        }

        if self.max_concurrent_dispatches == 0 {
            bail!("max_concurrent_dispatches must be greater than 0");
        }

        if self.dispatch_max_attempts == 0 {
            bail!("dispatch_max_attempts must be greater than 0");
        }

        if self.dispatch_timeout.is_zero() || self.health_timeout.is_zero() {
            bail!("dispatch_timeout and health_timeout must be greater than 0");
        }

        if self.health_port.parse::<u16>().is_err() {
            bail!("health_port must be a port number, got {}", self.health_port);
        }

        if self.nodes.is_empty() {
            bail!("at least one node must be configured");
        }

        if self.transport == TransportKind::Command && self.agent_command.trim().is_empty() {
            bail!("agent_command cannot be empty with the command transport");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.dispatch_max_attempts,
            base_delay: self.dispatch_base_delay,
            attempt_timeout: self.dispatch_timeout,
        }
    }
}
