//! Queue repository
//!
//! Handles communication with the upstream queue for one (stack, queue) pair:
//! - Listing scheduled jobs page by page
//! - Batch-reserving jobs under a lease
//! - Finishing jobs that could not be started

use anyhow::{Context, Result};
use async_trait::async_trait;
use spritestack_client::QueueClient;
use spritestack_core::dto::stack::{BatchReserveResult, ListScheduledJobs, ScheduledJobsPage};
use std::time::Duration;
use uuid::Uuid;

/// Repository trait for the upstream calls made by the control loop
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Fetches one page of scheduled jobs
    ///
    /// # Arguments
    /// * `cursor` - End cursor of the previous page, `None` for the first page
    async fn list_scheduled_jobs(&self, cursor: Option<String>) -> Result<ScheduledJobsPage>;

    /// Reserves a batch of jobs for `expiry`
    ///
    /// # Arguments
    /// * `job_ids` - The jobs to reserve
    /// * `expiry` - Lease duration, sent with second granularity
    async fn reserve_jobs(
        &self,
        job_ids: Vec<Uuid>,
        expiry: Duration,
    ) -> Result<BatchReserveResult>;

    /// Reports the outcome of a job
    ///
    /// # Arguments
    /// * `job_id` - The job to finish
    /// * `exit_status` - Exit status recorded on the job
    /// * `detail` - Free-text detail
    async fn finish_job(&self, job_id: Uuid, exit_status: i32, detail: &str) -> Result<()>;
}

/// HTTP implementation of QueueRepository
pub struct HttpQueueRepository {
    client: QueueClient,
    stack_key: String,
    queue_key: String,
    page_size: u32,
}

impl HttpQueueRepository {
    /// Creates a new HTTP queue repository
    ///
    /// # Arguments
    /// * `client` - Upstream queue client
    /// * `stack_key` - The registered stack key
    /// * `queue_key` - The queue to poll
    /// * `page_size` - Jobs requested per page
    pub fn new(client: QueueClient, stack_key: String, queue_key: String, page_size: u32) -> Self {
        Self {
            client,
            stack_key,
            queue_key,
            page_size,
        }
    }
}

#[async_trait]
impl QueueRepository for HttpQueueRepository {
    async fn list_scheduled_jobs(&self, cursor: Option<String>) -> Result<ScheduledJobsPage> {
        let query = ListScheduledJobs {
            queue_key: self.queue_key.clone(),
            limit: self.page_size,
            cursor,
        };

        self.client
            .list_scheduled_jobs(&self.stack_key, &query)
            .await
            .context("Failed to list scheduled jobs")
    }

    async fn reserve_jobs(
        &self,
        job_ids: Vec<Uuid>,
        expiry: Duration,
    ) -> Result<BatchReserveResult> {
        self.client
            .batch_reserve_jobs(&self.stack_key, job_ids, expiry)
            .await
            .context("Failed to reserve jobs")
    }

    async fn finish_job(&self, job_id: Uuid, exit_status: i32, detail: &str) -> Result<()> {
        self.client
            .finish_job(&self.stack_key, job_id, exit_status, detail)
            .await
            .context("Failed to finish job")
    }
}
