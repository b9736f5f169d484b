//! Failure reporter
//!
//! Tells the upstream queue that a reserved job failed to start. Reporting
//! is best-effort: a failed report is logged and swallowed, leaving the job
//! reserved until its lease expires.

use spritestack_core::domain::dispatch::FAILED_TO_START_EXIT_STATUS;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ledger::JobLedger;
use crate::repository::QueueRepository;

pub struct FailureReporter {
    queue: Arc<dyn QueueRepository>,
    ledger: Arc<JobLedger>,
}

impl FailureReporter {
    pub fn new(queue: Arc<dyn QueueRepository>, ledger: Arc<JobLedger>) -> Self {
        Self { queue, ledger }
    }

    /// Reports `job_id` as failed to start and clears its ledger entry
    pub async fn report(&self, job_id: Uuid, detail: &str) {
        let origin = match self.ledger.get(job_id) {
            Ok(Some(snapshot)) => format!(
                " ({} build #{})",
                snapshot.pipeline.slug, snapshot.build.number
            ),
            Ok(None) => String::new(),
            Err(e) => {
                warn!("{}", e);
                String::new()
            }
        };

        match self
            .queue
            .finish_job(job_id, FAILED_TO_START_EXIT_STATUS, detail)
            .await
        {
            Ok(()) => info!("Reported job {}{} as failed to start", job_id, origin),
            Err(e) => error!(
                "Failed to report job {}{} as failed: {:#}",
                job_id, origin, e
            ),
        }

        self.ledger.remove(job_id);
    }
}
