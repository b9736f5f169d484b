//! Reservation coordinator
//!
//! Turns a batch of polled jobs into one upstream reservation request,
//! reconciles the ledger against the result and dispatches reserved jobs.
//!
//! Every job is ledgered before the reservation request is sent, so an
//! interrupted cycle leaves its entries visible until their TTL lapses.

use spritestack_core::domain::dispatch::DispatchOutcome;
use spritestack_core::domain::job::{Reservation, ScheduledJob};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ledger::JobLedger;
use crate::repository::QueueRepository;
use crate::service::DispatchEngine;

/// What happened to one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Jobs in the batch
    pub jobs: usize,
    /// Repeated copies of a job already in the batch
    pub duplicates: usize,
    /// Jobs left out of the reservation because they could not be ledgered
    pub unrecorded: usize,
    pub reserved: usize,
    pub not_reserved: usize,
    pub dispatched: usize,
    pub failed: usize,
}

pub struct ReservationCoordinator {
    queue: Arc<dyn QueueRepository>,
    ledger: Arc<JobLedger>,
    dispatcher: Arc<DispatchEngine>,
    reservation_expiry: Duration,
    permits: Arc<Semaphore>,
}

impl ReservationCoordinator {
    /// Creates a coordinator running at most `max_concurrent_dispatches`
    /// dispatches at a time
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        ledger: Arc<JobLedger>,
        dispatcher: Arc<DispatchEngine>,
        reservation_expiry: Duration,
        max_concurrent_dispatches: usize,
    ) -> Self {
        Self {
            queue,
            ledger,
            dispatcher,
            reservation_expiry,
            permits: Arc::new(Semaphore::new(max_concurrent_dispatches)),
        }
    }

    /// Reserves and dispatches a batch of scheduled jobs
    ///
    /// An empty batch is a no-op. A failed reservation request counts as
    /// nothing reserved; the batch's ledger entries then stay until their
    /// TTL lapses.
    pub async fn process_batch(&self, jobs: Vec<ScheduledJob>) -> BatchSummary {
        let mut summary = BatchSummary {
            jobs: jobs.len(),
            ..BatchSummary::default()
        };

        if jobs.is_empty() {
            return summary;
        }

        let mut seen = HashSet::with_capacity(jobs.len());
        let mut job_ids = Vec::with_capacity(jobs.len());
        for job in &jobs {
            if !seen.insert(job.id) {
                warn!("Job {} appeared more than once in the batch", job.id);
                summary.duplicates += 1;
                continue;
            }

            match self.ledger.record(job) {
                Ok(_) => job_ids.push(job.id),
                Err(e) => {
                    warn!("Not reserving job {} this cycle: {}", job.id, e);
                    summary.unrecorded += 1;
                }
            }
        }

        if job_ids.is_empty() {
            return summary;
        }

        let result = match self
            .queue
            .reserve_jobs(job_ids.clone(), self.reservation_expiry)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to reserve {} job(s): {:#}", job_ids.len(), e);
                return summary;
            }
        };

        let mut requested: HashSet<Uuid> = job_ids.iter().copied().collect();
        let mut reserved = Vec::with_capacity(result.reserved.len());
        for id in result.reserved {
            if requested.remove(&id) {
                reserved.push(id);
            } else {
                warn!(
                    "Ignoring reserved job {} which was not requested or was already reserved",
                    id
                );
            }
        }

        // Anything requested but not reported as reserved is treated as taken
        let not_reserved: Vec<Uuid> = job_ids
            .into_iter()
            .filter(|id| requested.contains(id))
            .collect();

        for id in &not_reserved {
            self.ledger.remove(*id);
        }
        if !not_reserved.is_empty() {
            warn!("Some jobs were not reserved: {:?}", not_reserved);
        }

        summary.reserved = reserved.len();
        summary.not_reserved = not_reserved.len();

        if !reserved.is_empty() {
            info!("Reserved {} job(s), dispatching", reserved.len());
        }

        for (_, outcome) in self.dispatch_all(reserved).await {
            if outcome.is_success() {
                summary.dispatched += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    /// Dispatches every reserved job concurrently, bounded by the permit
    /// pool, and waits for all of them
    async fn dispatch_all(&self, job_ids: Vec<Uuid>) -> Vec<(Uuid, DispatchOutcome)> {
        let mut handles = Vec::with_capacity(job_ids.len());
        let mut outcomes = Vec::with_capacity(job_ids.len());

        for job_id in job_ids {
            // The pool is never closed while the coordinator is alive
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let detail = "dispatch pool closed before the job was started";
                    error!("Cannot dispatch job {}: {}", job_id, detail);
                    self.dispatcher.report_failure(job_id, detail).await;
                    outcomes.push((job_id, DispatchOutcome::failed(detail, 0)));
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let reservation = Reservation::new(job_id, self.reservation_expiry);
            let handle = tokio::spawn(async move {
                let outcome = dispatcher.dispatch(reservation).await;
                drop(permit);
                outcome
            });
            handles.push((job_id, handle));
        }

        for (job_id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push((job_id, outcome)),
                Err(e) => warn!("Dispatch task for job {} panicked: {}", job_id, e),
            }
        }

        outcomes
    }
}
