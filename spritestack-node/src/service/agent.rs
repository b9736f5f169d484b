//! Agent Launcher
//!
//! Starts one agent process per accepted job, never more than the
//! configured agent limit at a time. A slot is held until its process exits.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Default path of the agent binary, relative to the node's working directory
pub const DEFAULT_AGENT_BINARY: &str = ".buildkite-agent/bin/buildkite-agent";

/// Launcher error type
#[derive(Debug)]
pub enum LaunchError {
    AtCapacity { limit: usize },
    SpawnFailed(std::io::Error),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::AtCapacity { limit } => {
                write!(f, "agent limit of {} reached", limit)
            }
            LaunchError::SpawnFailed(err) => write!(f, "failed to spawn agent: {}", err),
        }
    }
}

impl std::error::Error for LaunchError {}

pub struct AgentLauncher {
    program: String,
    args: Vec<String>,
    limit: usize,
    slots: Arc<Semaphore>,
}

impl AgentLauncher {
    /// Launches `<binary> start --acquire-job <job>` for every job
    pub fn new(binary: impl Into<String>, limit: usize) -> Self {
        Self::with_command(binary, vec!["start".to_string()], limit)
    }

    /// Launches `<program> <args..> --acquire-job <job>` for every job
    pub fn with_command(program: impl Into<String>, args: Vec<String>, limit: usize) -> Self {
        Self {
            program: program.into(),
            args,
            limit,
            slots: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Agents currently running
    pub fn active(&self) -> usize {
        self.limit.saturating_sub(self.slots.available_permits())
    }

    /// Starts the agent for `job_id` and returns the number of running agents
    ///
    /// Fails immediately when every slot is taken.
    pub fn launch(&self, job_id: Uuid) -> Result<usize, LaunchError> {
        let slot = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| LaunchError::AtCapacity { limit: self.limit })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--acquire-job")
            .arg(job_id.to_string())
            .stdin(Stdio::null())
            .spawn()
            .map_err(LaunchError::SpawnFailed)?;

        tracing::info!(
            "Started agent for job {} (pid {:?})",
            job_id,
            child.id()
        );

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!("Agent for job {} exited", job_id);
                }
                Ok(status) => {
                    tracing::warn!("Agent for job {} exited with {}", job_id, status);
                }
                Err(e) => {
                    tracing::error!("Failed to wait on agent for job {}: {}", job_id, e);
                }
            }
            drop(slot);
        });

        Ok(self.active())
    }
}
