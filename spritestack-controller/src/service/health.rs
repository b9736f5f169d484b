//! Health gate
//!
//! Probes a node's liveness endpoint before dispatch. The probe also wakes
//! nodes that scale to zero when idle, so a failed probe is expected during
//! a cold start; retrying is the caller's decision.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use spritestack_core::domain::node::NodeHealth;
use std::time::Duration;
use tracing::debug;

/// Port used when the caller passes an empty one
pub const DEFAULT_HEALTH_PORT: &str = "8080";

/// Liveness path served by every node
pub const HEALTH_PATH: &str = "/health";

/// Service trait for node liveness probes
#[async_trait]
pub trait HealthGate: Send + Sync {
    /// Performs one liveness probe against `address:port`
    ///
    /// # Arguments
    /// * `address` - Host name or IP of the node
    /// * `port` - Port of the liveness endpoint, empty for the default
    async fn probe(&self, address: &str, port: &str) -> NodeHealth;
}

/// HTTP implementation of HealthGate
pub struct HttpHealthGate {
    client: Client,
    timeout: Duration,
}

impl HttpHealthGate {
    /// Creates a health gate whose probes give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build health check client")?;

        Ok(Self { client, timeout })
    }
}

/// Builds the liveness URL, applying the default port to an empty one
pub fn health_url(address: &str, port: &str) -> String {
    let port = if port.is_empty() {
        DEFAULT_HEALTH_PORT
    } else {
        port
    };
    format!("http://{}:{}{}", address, port, HEALTH_PATH)
}

#[async_trait]
impl HealthGate for HttpHealthGate {
    async fn probe(&self, address: &str, port: &str) -> NodeHealth {
        let url = health_url(address, port);
        debug!("Probing {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return NodeHealth::unhealthy(format!(
                    "health check timed out after {:?}",
                    self.timeout
                ));
            }
            Err(e) => return NodeHealth::unhealthy(format!("health check failed: {}", e)),
        };

        if response.status() == StatusCode::OK {
            NodeHealth::Healthy
        } else {
            NodeHealth::unhealthy(format!(
                "node returned status {}, unhealthy",
                response.status().as_u16()
            ))
        }
    }
}
