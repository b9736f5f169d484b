//! Scheduled job endpoints

use crate::QueueClient;
use crate::error::Result;
use spritestack_core::dto::stack::{
    BatchReserveJobs, BatchReserveResult, FinishJob, ListScheduledJobs, ScheduledJobsPage,
};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

impl QueueClient {
    // =============================================================================
    // Scheduled Jobs
    // =============================================================================

    /// List one page of scheduled jobs for a queue
    ///
    /// # Arguments
    /// * `stack_key` - The registered stack key
    /// * `query` - Queue key, page size and the cursor of the previous page
    pub async fn list_scheduled_jobs(
        &self,
        stack_key: &str,
        query: &ListScheduledJobs,
    ) -> Result<ScheduledJobsPage> {
        let path = format!("/stacks/{}/scheduled_jobs", stack_key);
        let response = self.get(&path).query(query).send().await?;

        self.handle_response(response).await
    }

    /// Reserve a batch of jobs under a lease
    ///
    /// The result partitions the requested identifiers into reserved and
    /// not reserved.
    pub async fn batch_reserve_jobs(
        &self,
        stack_key: &str,
        job_uuids: Vec<Uuid>,
        expiry: Duration,
    ) -> Result<BatchReserveResult> {
        let path = format!("/stacks/{}/scheduled_jobs/batch_reserve", stack_key);
        debug!("Reserving {} job(s) for {:?}", job_uuids.len(), expiry);

        let response = self
            .post(&path)
            .json(&BatchReserveJobs {
                job_uuids,
                reservation_expiry_seconds: expiry.as_secs(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report the outcome of a job
    ///
    /// # Arguments
    /// * `stack_key` - The registered stack key
    /// * `job_id` - The job to finish
    /// * `exit_status` - Exit status to record
    /// * `detail` - Free-text detail shown on the job
    pub async fn finish_job(
        &self,
        stack_key: &str,
        job_id: Uuid,
        exit_status: i32,
        detail: &str,
    ) -> Result<()> {
        let path = format!("/stacks/{}/jobs/{}/finish", stack_key, job_id);
        let response = self
            .post(&path)
            .json(&FinishJob {
                exit_status,
                detail: detail.to_string(),
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
