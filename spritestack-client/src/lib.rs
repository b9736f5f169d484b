//! Sprite Stack HTTP Client
//!
//! A small, type-safe HTTP client for the upstream queue service (the
//! Buildkite stacks API). The controller drives its whole control loop
//! through this client: registering the stack, listing scheduled jobs,
//! reserving them and reporting jobs that failed to start.
//!
//! # Example
//!
//! ```no_run
//! use spritestack_client::QueueClient;
//! use spritestack_core::dto::stack::RegisterStack;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = QueueClient::new("https://agent.buildkite.com/v3", "agent-token");
//!
//!     let stack = client
//!         .register_stack(&RegisterStack::custom("bk-sprites", "default"))
//!         .await?;
//!
//!     println!("Registered stack: {}", stack.key);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod stacks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Default base URL of the upstream queue service
pub const DEFAULT_API_URL: &str = "https://agent.buildkite.com/v3";

/// HTTP client for the upstream queue service
///
/// Methods are organized into two groups:
/// - Stack registration (register, deregister)
/// - Scheduled job lifecycle (list, batch reserve, finish)
#[derive(Debug, Clone)]
pub struct QueueClient {
    /// Base URL of the API (e.g., "https://agent.buildkite.com/v3")
    base_url: String,
    /// Agent token sent with every request
    token: String,
    /// HTTP client instance
    client: Client,
}

impl QueueClient {
    /// Create a new queue client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API
    /// * `token` - The agent token used to authenticate
    ///
    /// # Example
    /// ```
    /// use spritestack_client::QueueClient;
    ///
    /// let client = QueueClient::new("https://agent.buildkite.com/v3", "token");
    /// ```
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(base_url, token, Client::new())
    }

    /// Create a new queue client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use spritestack_client::QueueClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = QueueClient::with_client("https://agent.buildkite.com/v3", "token", http_client);
    /// ```
    pub fn with_client(
        base_url: impl Into<String>,
        token: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Token {}", self.token),
        )
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = QueueClient::new("http://localhost:8080", "token");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = QueueClient::new("https://agent.buildkite.com/v3/", "token");
        assert_eq!(client.base_url(), "https://agent.buildkite.com/v3");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = QueueClient::with_client(DEFAULT_API_URL, "token", http_client);
        assert_eq!(client.base_url(), DEFAULT_API_URL);
    }
}
