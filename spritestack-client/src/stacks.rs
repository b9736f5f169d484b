//! Stack registration endpoints

use crate::QueueClient;
use crate::error::Result;
use spritestack_core::dto::stack::{RegisterStack, Stack};

impl QueueClient {
    // =============================================================================
    // Stack Registration & Lifecycle
    // =============================================================================

    /// Register a stack with the upstream queue
    ///
    /// Must be called once before polling; polling against a stack key that
    /// was never registered is undefined upstream.
    ///
    /// # Example
    /// ```no_run
    /// # use spritestack_client::QueueClient;
    /// # use spritestack_core::dto::stack::RegisterStack;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = QueueClient::new("https://agent.buildkite.com/v3", "token");
    /// let stack = client
    ///     .register_stack(&RegisterStack::custom("bk-sprites", "default"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn register_stack(&self, req: &RegisterStack) -> Result<Stack> {
        let response = self.post("/stacks/register").json(req).send().await?;

        self.handle_response(response).await
    }

    /// Deregister a stack
    ///
    /// # Arguments
    /// * `stack_key` - The key the stack was registered with
    pub async fn deregister_stack(&self, stack_key: &str) -> Result<()> {
        let path = format!("/stacks/{}/deregister", stack_key);
        let response = self.post(&path).send().await?;

        self.handle_empty_response(response).await
    }
}
