//! Node transports
//!
//! A transport starts the agent process for one job on one node. Every
//! failure is returned as a tagged [`TransportError`] so retry decisions are
//! an exhaustive match; text matching is only used for messages that come
//! from the far side (a remote process's stderr, a node's error body).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use spritestack_core::domain::node::ComputeNode;
use spritestack_core::dto::agent::StartJob;
use std::error::Error as StdError;
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Phrases that identify a transient failure in free-form error text
const TRANSIENT_PHRASES: [&str; 3] = ["i/o timeout", "failed to connect", "connection reset by peer"];

/// Default command used to start an agent on a sprite
pub const DEFAULT_AGENT_COMMAND: &str =
    "sprite exec -s {node} .buildkite-agent/bin/buildkite-agent start --acquire-job {job}";

/// Failure to start an agent on a node
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The launcher process exited unsuccessfully
    #[error("agent command exited with {}: {stderr}", exit_code_label(.code))]
    Exited { code: Option<i32>, stderr: String },

    /// The node answered with a non-success status
    #[error("node rejected job (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl TransportError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_)
            | TransportError::ConnectionRefused(_)
            | TransportError::ConnectionReset(_) => true,
            TransportError::Exited { stderr, .. } => is_transient_message(stderr),
            TransportError::Rejected { message, .. } => is_transient_message(message),
            TransportError::Other(message) => is_transient_message(message),
        }
    }
}

/// Case-insensitive match against the known transient failure phrases
pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = Some(err);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = err.source();
    }
    None
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let message = error_chain(&err);
        match err.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout(message),
            io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(message),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset(message)
            }
            _ => TransportError::Other(message),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);

        if err.is_timeout() {
            return TransportError::Timeout(message);
        }

        match io_error_kind(&err) {
            Some(io::ErrorKind::TimedOut) => TransportError::Timeout(message),
            Some(io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted) => {
                TransportError::ConnectionReset(message)
            }
            Some(io::ErrorKind::ConnectionRefused) => TransportError::ConnectionRefused(message),
            _ if err.is_connect() => TransportError::ConnectionRefused(message),
            _ => TransportError::Other(message),
        }
    }
}

/// Starts the agent process for a job on a node
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Starts an agent on `node` that acquires exactly `job_id`
    ///
    /// Acquiring the same job twice is a no-op upstream, so a retried
    /// start after an ambiguous failure is safe.
    async fn start_agent(&self, node: &ComputeNode, job_id: Uuid) -> Result<(), TransportError>;
}

/// Asks the node agent's HTTP endpoint to start the job
pub struct HttpAgentTransport {
    client: Client,
    port: String,
}

impl HttpAgentTransport {
    /// Creates a transport talking to the node agent on `port`
    pub fn new(port: impl Into<String>) -> Self {
        Self::with_client(Client::new(), port)
    }

    pub fn with_client(client: Client, port: impl Into<String>) -> Self {
        Self {
            client,
            port: port.into(),
        }
    }

    fn job_url(&self, node: &ComputeNode) -> String {
        format!("http://{}:{}/job", node.address, self.port)
    }
}

#[async_trait]
impl NodeTransport for HttpAgentTransport {
    async fn start_agent(&self, node: &ComputeNode, job_id: Uuid) -> Result<(), TransportError> {
        let url = self.job_url(node);
        debug!("Requesting agent start for job {} at {}", job_id, url);

        let response = self
            .client
            .post(&url)
            .json(&StartJob { job_uuid: job_id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Runs a local launcher command that starts the agent on the node
///
/// Arguments may contain `{node}`, `{address}` and `{job}` placeholders.
pub struct CommandTransport {
    program: String,
    args: Vec<String>,
}

impl CommandTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a transport from a whitespace separated command template
    pub fn from_template(template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("agent command cannot be empty"))?;

        Ok(Self::new(program, parts.collect()))
    }

    fn render_args(&self, node: &ComputeNode, job_id: Uuid) -> Vec<String> {
        let job = job_id.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{node}", &node.name)
                    .replace("{address}", &node.address)
                    .replace("{job}", &job)
            })
            .collect()
    }
}

#[async_trait]
impl NodeTransport for CommandTransport {
    async fn start_agent(&self, node: &ComputeNode, job_id: Uuid) -> Result<(), TransportError> {
        let args = self.render_args(node, job_id);
        info!("Running '{} {}' for job {}", self.program, args.join(" "), job_id);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("agent command stdout: {}", stdout.trim());
        }

        if output.status.success() {
            return Ok(());
        }

        Err(TransportError::Exited {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
