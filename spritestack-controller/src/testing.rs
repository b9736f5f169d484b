//! In-memory fakes for the controller's seams

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use spritestack_core::domain::job::ScheduledJob;
use spritestack_core::domain::node::{ComputeNode, NodeHealth};
use spritestack_core::dto::stack::{
    BatchReserveResult, ClusterQueue, PageInfo, ScheduledJobsPage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ledger::{JobLedger, Ledger};
use crate::node::{NodeTransport, TransportError};
use crate::repository::QueueRepository;
use crate::service::HealthGate;

pub fn job() -> ScheduledJob {
    ScheduledJob {
        id: Uuid::new_v4(),
        priority: 0,
        agent_query_rules: vec!["queue=default".to_string()],
        scheduled_at: Utc::now(),
        pipeline: Default::default(),
        build: Default::default(),
        step: Default::default(),
    }
}

pub fn jobs(count: usize) -> Vec<ScheduledJob> {
    (0..count).map(|_| job()).collect()
}

/// A job ledger without expiry, plus `count` jobs already recorded in it
pub fn ledger_with(count: usize) -> (Arc<JobLedger>, Vec<ScheduledJob>) {
    let ledger = Arc::new(JobLedger::new(Arc::new(Ledger::new(100)), Duration::ZERO));
    let jobs = jobs(count);
    for job in &jobs {
        ledger.record(job).unwrap();
    }
    (ledger, jobs)
}

pub fn page(jobs: Vec<ScheduledJob>, next_cursor: Option<&str>) -> ScheduledJobsPage {
    ScheduledJobsPage {
        jobs,
        cluster_queue: ClusterQueue {
            key: "default".to_string(),
            paused: false,
        },
        page_info: PageInfo {
            has_next_page: next_cursor.is_some(),
            end_cursor: next_cursor.map(str::to_string),
        },
    }
}

pub fn paused_page() -> ScheduledJobsPage {
    let mut page = page(jobs(2), None);
    page.cluster_queue.paused = true;
    page
}

enum ReserveBehaviour {
    All,
    Only(Vec<Uuid>),
    Fail,
}

/// Scripted upstream queue
pub struct FakeQueue {
    pages: Mutex<VecDeque<Result<ScheduledJobsPage, String>>>,
    cursors: Mutex<Vec<Option<String>>>,
    reserve: Mutex<ReserveBehaviour>,
    reserve_calls: Mutex<Vec<Vec<Uuid>>>,
    observed_ledger: Mutex<Option<Arc<JobLedger>>>,
    ledgered_at_reserve: Mutex<Vec<bool>>,
    finished: Mutex<Vec<(Uuid, i32, String)>>,
    fail_finish: AtomicBool,
}

impl Default for FakeQueue {
    fn default() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            cursors: Mutex::new(Vec::new()),
            reserve: Mutex::new(ReserveBehaviour::All),
            reserve_calls: Mutex::new(Vec::new()),
            observed_ledger: Mutex::new(None),
            ledgered_at_reserve: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            fail_finish: AtomicBool::new(false),
        }
    }
}

impl FakeQueue {
    pub fn push_page(&self, page: ScheduledJobsPage) {
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_page_error(&self, message: &str) {
        self.pages.lock().unwrap().push_back(Err(message.to_string()));
    }

    /// Reserve only `ids`; every other requested job comes back not reserved
    pub fn reserve_only(&self, ids: Vec<Uuid>) {
        *self.reserve.lock().unwrap() = ReserveBehaviour::Only(ids);
    }

    pub fn fail_reserve(&self) {
        *self.reserve.lock().unwrap() = ReserveBehaviour::Fail;
    }

    pub fn fail_finish(&self) {
        self.fail_finish.store(true, Ordering::SeqCst);
    }

    /// Record, for each reserve request, whether its jobs were already ledgered
    pub fn observe_ledger(&self, ledger: Arc<JobLedger>) {
        *self.observed_ledger.lock().unwrap() = Some(ledger);
    }

    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn reserve_calls(&self) -> Vec<Vec<Uuid>> {
        self.reserve_calls.lock().unwrap().clone()
    }

    pub fn ledgered_at_reserve(&self) -> Vec<bool> {
        self.ledgered_at_reserve.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(Uuid, i32, String)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueRepository for FakeQueue {
    async fn list_scheduled_jobs(&self, cursor: Option<String>) -> Result<ScheduledJobsPage> {
        self.cursors.lock().unwrap().push(cursor);

        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(page(Vec::new(), None)),
        }
    }

    async fn reserve_jobs(
        &self,
        job_ids: Vec<Uuid>,
        _expiry: Duration,
    ) -> Result<BatchReserveResult> {
        self.reserve_calls.lock().unwrap().push(job_ids.clone());

        if let Some(ledger) = self.observed_ledger.lock().unwrap().as_ref() {
            let all_ledgered = job_ids.iter().all(|id| ledger.contains(*id));
            self.ledgered_at_reserve.lock().unwrap().push(all_ledgered);
        }

        match &*self.reserve.lock().unwrap() {
            ReserveBehaviour::All => Ok(BatchReserveResult {
                reserved: job_ids,
                not_reserved: Vec::new(),
            }),
            ReserveBehaviour::Only(ids) => {
                let (reserved, not_reserved) =
                    job_ids.into_iter().partition(|id| ids.contains(id));
                Ok(BatchReserveResult {
                    reserved,
                    not_reserved,
                })
            }
            ReserveBehaviour::Fail => Err(anyhow!("connection reset by peer")),
        }
    }

    async fn finish_job(&self, job_id: Uuid, exit_status: i32, detail: &str) -> Result<()> {
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(anyhow!("API error (status 500): internal error"));
        }

        self.finished
            .lock()
            .unwrap()
            .push((job_id, exit_status, detail.to_string()));
        Ok(())
    }
}

/// Health gate that answers from a fixed state
#[derive(Default)]
pub struct FakeHealth {
    unhealthy: Mutex<Option<String>>,
    probes: AtomicUsize,
}

impl FakeHealth {
    pub fn set_unhealthy(&self, reason: &str) {
        *self.unhealthy.lock().unwrap() = Some(reason.to_string());
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthGate for FakeHealth {
    async fn probe(&self, _address: &str, _port: &str) -> NodeHealth {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.unhealthy.lock().unwrap().as_ref() {
            Some(reason) => NodeHealth::unhealthy(reason.clone()),
            None => NodeHealth::Healthy,
        }
    }
}

/// Transport that fails from a script, then succeeds
#[derive(Default)]
pub struct FakeTransport {
    failures: Mutex<VecDeque<TransportError>>,
    hang: AtomicUsize,
    calls: Mutex<Vec<(Uuid, Instant)>>,
    started: Mutex<Vec<Uuid>>,
}

impl FakeTransport {
    pub fn push_failure(&self, err: TransportError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// Never complete the next `count` attempts
    pub fn hang_first(&self, count: usize) {
        self.hang.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Time between consecutive attempts
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls
            .windows(2)
            .map(|pair| pair[1].1.duration_since(pair[0].1))
            .collect()
    }

    /// Jobs whose agent was started successfully, in order
    pub fn started_jobs(&self) -> Vec<Uuid> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeTransport for FakeTransport {
    async fn start_agent(&self, _node: &ComputeNode, job_id: Uuid) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push((job_id, Instant::now()));

        let hang = self
            .hang
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            std::future::pending::<()>().await;
        }

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        self.started.lock().unwrap().push(job_id);
        Ok(())
    }
}
