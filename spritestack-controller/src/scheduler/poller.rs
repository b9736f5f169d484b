//! Queue poller
//!
//! Polls the upstream queue on a fixed interval. Each cycle follows the
//! cursor chain to the last page and hands every job it found to the
//! reservation coordinator as one batch, in upstream order.

use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::ledger::JobLedger;
use crate::repository::QueueRepository;
use crate::scheduler::coordinator::{BatchSummary, ReservationCoordinator};

#[derive(Debug, Error)]
pub enum PollError {
    /// The poller was asked to stop
    #[error("poller cancelled")]
    Cancelled,

    /// A page request failed and the cycle was abandoned
    #[error("failed to list scheduled jobs: {0:#}")]
    Upstream(anyhow::Error),
}

/// What one poll cycle saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub paused: bool,
    pub pages: usize,
    pub batch: BatchSummary,
}

pub struct QueuePoller {
    queue: Arc<dyn QueueRepository>,
    coordinator: ReservationCoordinator,
    ledger: Arc<JobLedger>,
    queue_key: String,
    interval: Duration,
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        coordinator: ReservationCoordinator,
        ledger: Arc<JobLedger>,
        queue_key: String,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            coordinator,
            ledger,
            queue_key,
            interval,
        }
    }

    /// Runs poll cycles until `cancel` fires
    ///
    /// Upstream errors abort the current cycle only. The sole way out is
    /// cancellation, which is returned as [`PollError::Cancelled`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<Infallible, PollError> {
        info!(
            "Starting queue poller for queue {} (interval: {:?})",
            self.queue_key, self.interval
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = interval.tick() => {}
            }

            match self.poll_once(&cancel).await {
                Ok(summary) if summary.batch.jobs > 0 => {
                    let batch = &summary.batch;
                    info!(
                        "Processed {} jobs on queue {}: {} duplicate, {} reserved, {} not reserved, {} unrecorded, {} dispatched, {} failed",
                        batch.jobs,
                        self.queue_key,
                        batch.duplicates,
                        batch.reserved,
                        batch.not_reserved,
                        batch.unrecorded,
                        batch.dispatched,
                        batch.failed
                    );
                    debug!("Ledger holds {} in-flight entries", self.ledger.len());
                }
                Ok(summary) if summary.paused => {
                    debug!("Queue {} is paused, skipping cycle", self.queue_key);
                }
                Ok(_) => {}
                Err(PollError::Cancelled) => return Err(PollError::Cancelled),
                Err(e) => error!("Error during poll cycle: {}", e),
            }
        }
    }

    /// Performs a single poll cycle
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<CycleSummary, PollError> {
        let purged = self.ledger.purge_expired();
        if purged > 0 {
            debug!("Purged {} expired ledger entries", purged);
        }

        let mut summary = CycleSummary::default();
        let mut jobs = Vec::new();
        let mut cursor = None;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            let page = self
                .queue
                .list_scheduled_jobs(cursor.take())
                .await
                .map_err(PollError::Upstream)?;
            summary.pages += 1;

            if page.cluster_queue.paused {
                summary.paused = true;
                return Ok(summary);
            }

            jobs.extend(page.jobs);

            match page.page_info.end_cursor {
                Some(next) if page.page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }

        if jobs.is_empty() {
            debug!("No scheduled jobs on queue {}", self.queue_key);
            return Ok(summary);
        }

        debug!(
            "Found {} scheduled job(s) across {} page(s)",
            jobs.len(),
            summary.pages
        );
        summary.batch = self.coordinator.process_batch(jobs).await;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::node::SingleNode;
    use crate::service::{DispatchEngine, FailureReporter, RetryPolicy};
    use crate::testing::{FakeHealth, FakeQueue, FakeTransport, jobs, page, paused_page};
    use spritestack_core::domain::node::ComputeNode;
    use uuid::Uuid;

    struct Harness {
        queue: Arc<FakeQueue>,
        transport: Arc<FakeTransport>,
        ledger: Arc<JobLedger>,
        poller: QueuePoller,
    }

    fn harness(ledger_ttl: Duration) -> Harness {
        let queue = Arc::new(FakeQueue::default());
        let transport = Arc::new(FakeTransport::default());
        let ledger = Arc::new(JobLedger::new(Arc::new(Ledger::new(100)), ledger_ttl));

        let dispatcher = Arc::new(DispatchEngine::new(
            Arc::new(SingleNode::new(ComputeNode::new("bk-test-1", "10.0.0.5"))),
            Arc::new(FakeHealth::default()),
            transport.clone(),
            FailureReporter::new(queue.clone(), Arc::clone(&ledger)),
            Arc::clone(&ledger),
            RetryPolicy::default(),
            "8080".to_string(),
        ));
        let coordinator = ReservationCoordinator::new(
            queue.clone(),
            Arc::clone(&ledger),
            dispatcher,
            Duration::from_secs(30),
            4,
        );
        let poller = QueuePoller::new(
            queue.clone(),
            coordinator,
            Arc::clone(&ledger),
            "default".to_string(),
            Duration::from_secs(1),
        );

        Harness {
            queue,
            transport,
            ledger,
            poller,
        }
    }

    #[tokio::test]
    async fn test_paused_queue_reserves_nothing() {
        let h = harness(Duration::ZERO);
        h.queue.push_page(paused_page());

        let summary = h.poller.poll_once(&CancellationToken::new()).await.unwrap();

        assert!(summary.paused);
        assert_eq!(summary.pages, 1);
        assert!(h.queue.reserve_calls().is_empty());
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_pages_are_batched_in_order() {
        let h = harness(Duration::ZERO);
        let first = jobs(2);
        let second = jobs(1);
        let expected: Vec<Uuid> = first.iter().chain(second.iter()).map(|j| j.id).collect();
        h.queue.push_page(page(first, Some("c1")));
        h.queue.push_page(page(second, None));

        let summary = h.poller.poll_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.batch.jobs, 3);
        assert_eq!(h.queue.cursors(), vec![None, Some("c1".to_string())]);
        assert_eq!(h.queue.reserve_calls(), vec![expected]);
        assert_eq!(h.transport.started_jobs().len(), 3);
    }

    #[tokio::test]
    async fn test_page_error_aborts_cycle() {
        let h = harness(Duration::ZERO);
        h.queue.push_page(page(jobs(2), Some("c1")));
        h.queue.push_page_error("connection reset by peer");

        let err = h
            .poller
            .poll_once(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Upstream(_)));
        assert!(err.to_string().contains("connection reset by peer"));
        assert!(h.queue.reserve_calls().is_empty());
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_empty_queue_skips_reservation() {
        let h = harness(Duration::ZERO);

        let summary = h.poller.poll_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(summary, CycleSummary {
            pages: 1,
            ..CycleSummary::default()
        });
        assert!(h.queue.reserve_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_cycle_stops_before_listing() {
        let h = harness(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.poller.poll_once(&cancel).await.unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert!(h.queue.cursors().is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged_each_cycle() {
        let h = harness(Duration::from_millis(30));
        h.queue.fail_reserve();
        h.queue.push_page(page(jobs(2), None));

        h.poller.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(h.ledger.len(), 2);

        time::sleep(Duration::from_millis(60)).await;
        h.poller.poll_once(&CancellationToken::new()).await.unwrap();

        assert!(h.ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_errors_until_cancelled() {
        let h = harness(Duration::ZERO);
        h.queue.push_page_error("i/o timeout");
        h.queue.push_page(page(jobs(1), None));
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(2500)).await;
            stopper.cancel();
        });

        let result = h.poller.run(cancel).await;

        assert!(matches!(result, Err(PollError::Cancelled)));
        // Ticks at 0s, 1s and 2s
        assert_eq!(h.queue.cursors().len(), 3);
        assert_eq!(h.transport.started_jobs().len(), 1);
    }
}
