//! Dispatch engine
//!
//! Starts the agent for one reserved job on a compute node:
//! - Selecting a node for the job
//! - Gating every attempt on a liveness probe
//! - Retrying transient failures with exponential backoff
//! - Reporting exhausted or non-retryable failures upstream
//!
//! Dispatches of different jobs are independent and may run concurrently.

use spritestack_core::domain::dispatch::DispatchOutcome;
use spritestack_core::domain::job::Reservation;
use spritestack_core::domain::node::{ComputeNode, NodeHealth};
use std::sync::Arc;
use thiserror::Error;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ledger::JobLedger;
use crate::node::{NodeSelector, NodeTransport, TransportError};
use crate::service::health::HealthGate;
use crate::service::reporter::FailureReporter;
use crate::service::retry::RetryPolicy;

/// Why a single start attempt failed
#[derive(Debug, Error)]
enum AttemptError {
    #[error("node {node} is unhealthy: {reason}")]
    Unhealthy { node: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            // A scaled-to-zero node fails its first probes while it wakes up
            AttemptError::Unhealthy { .. } => true,
            AttemptError::Transport(err) => err.is_retryable(),
        }
    }
}

pub struct DispatchEngine {
    selector: Arc<dyn NodeSelector>,
    health: Arc<dyn HealthGate>,
    transport: Arc<dyn NodeTransport>,
    reporter: FailureReporter,
    ledger: Arc<JobLedger>,
    policy: RetryPolicy,
    health_port: String,
}

impl DispatchEngine {
    pub fn new(
        selector: Arc<dyn NodeSelector>,
        health: Arc<dyn HealthGate>,
        transport: Arc<dyn NodeTransport>,
        reporter: FailureReporter,
        ledger: Arc<JobLedger>,
        policy: RetryPolicy,
        health_port: String,
    ) -> Self {
        Self {
            selector,
            health,
            transport,
            reporter,
            ledger,
            policy,
            health_port,
        }
    }

    /// Dispatches one reserved job and returns its terminal outcome
    ///
    /// The job's ledger entry is cleared on every terminal outcome.
    pub async fn dispatch(&self, reservation: Reservation) -> DispatchOutcome {
        let job_id = reservation.job_id;

        let Some(node) = self.selector.select(job_id) else {
            let detail = "no compute node available".to_string();
            error!("Cannot dispatch job {}: {}", job_id, detail);
            self.reporter.report(job_id, &detail).await;
            return DispatchOutcome::failed(detail, 0);
        };

        info!(
            "Dispatching job {} to {} (lease {:?})",
            job_id, node, reservation.expires_in
        );

        match self.start_with_retry(&node, job_id).await {
            Ok(attempts) => {
                self.ledger.remove(job_id);
                info!(
                    "Started agent for job {} on {} after {} attempt(s)",
                    job_id, node.name, attempts
                );
                DispatchOutcome::Dispatched {
                    node: node.name,
                    attempts,
                }
            }
            Err((err, attempts)) => {
                let detail = format!(
                    "failed to start agent on {} after {} attempt(s): {}",
                    node.name, attempts, err
                );
                error!("Job {} {}", job_id, detail);
                self.reporter.report(job_id, &detail).await;
                DispatchOutcome::failed(detail, attempts)
            }
        }
    }

    /// Reports a reserved job that will not be dispatched and clears its
    /// ledger entry
    pub async fn report_failure(&self, job_id: Uuid, detail: &str) {
        self.reporter.report(job_id, detail).await;
    }

    /// Runs attempts until one succeeds, a non-retryable error occurs or
    /// the attempt budget is spent
    async fn start_with_retry(
        &self,
        node: &ComputeNode,
        job_id: Uuid,
    ) -> Result<u32, (AttemptError, u32)> {
        let mut attempt = 1;

        loop {
            let err = match self.attempt(node, job_id).await {
                Ok(()) => return Ok(attempt),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                return Err((err, attempt));
            }

            let delay = self.policy.delay(attempt);
            warn!(
                "Start attempt {}/{} for job {} on {} failed, retrying in {:?}: {}",
                attempt, self.policy.max_attempts, job_id, node.name, delay, err
            );
            time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, node: &ComputeNode, job_id: Uuid) -> Result<(), AttemptError> {
        if let NodeHealth::Unhealthy { reason } =
            self.health.probe(&node.address, &self.health_port).await
        {
            return Err(AttemptError::Unhealthy {
                node: node.name.clone(),
                reason,
            });
        }

        match time::timeout(
            self.policy.attempt_timeout,
            self.transport.start_agent(node, job_id),
        )
        .await
        {
            Ok(result) => result.map_err(AttemptError::from),
            Err(_) => Err(TransportError::Timeout(format!(
                "agent start exceeded {:?}",
                self.policy.attempt_timeout
            ))
            .into()),
        }
    }
}
