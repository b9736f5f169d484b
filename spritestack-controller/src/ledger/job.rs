//! Typed job ledger
//!
//! Stores a JSON snapshot of each reserved job under `job:<id>`.

use spritestack_core::domain::job::{JobSnapshot, ScheduledJob};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{Ledger, LedgerError};

pub struct JobLedger {
    ledger: Arc<Ledger>,
    ttl: Duration,
}

impl JobLedger {
    /// Creates a job ledger whose entries expire after `ttl` (zero disables expiry)
    pub fn new(ledger: Arc<Ledger>, ttl: Duration) -> Self {
        Self { ledger, ttl }
    }

    fn key(job_id: Uuid) -> String {
        format!("job:{}", job_id)
    }

    /// Records a normalized snapshot of `job`
    pub fn record(&self, job: &ScheduledJob) -> Result<JobSnapshot, LedgerError> {
        let key = Self::key(job.id);
        let snapshot = JobSnapshot::from(job);
        let value = serde_json::to_string(&snapshot).map_err(|source| LedgerError::Serialize {
            key: key.clone(),
            source,
        })?;

        self.ledger.set(&key, value, self.ttl)?;
        debug!("Recorded job {} in ledger", job.id);

        Ok(snapshot)
    }

    /// Reads the snapshot for `job_id`
    ///
    /// Returns `Ok(None)` for a missing or expired entry and
    /// [`LedgerError::Corrupt`] when the stored value does not deserialize.
    pub fn get(&self, job_id: Uuid) -> Result<Option<JobSnapshot>, LedgerError> {
        let key = Self::key(job_id);
        let Some(raw) = self.ledger.get(&key) else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt { key, source })
    }

    /// Removes the entry for `job_id`, returning whether it was present
    pub fn remove(&self, job_id: Uuid) -> bool {
        let removed = self.ledger.delete(&Self::key(job_id));
        if removed {
            debug!("Removed job {} from ledger", job_id);
        }
        removed
    }

    #[allow(dead_code)]
    pub fn contains(&self, job_id: Uuid) -> bool {
        self.ledger.get(&Self::key(job_id)).is_some()
    }

    /// Drops expired snapshots, returning how many were reclaimed
    pub fn purge_expired(&self) -> usize {
        self.ledger.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
