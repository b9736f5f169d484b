//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A unit of work read from the upstream queue
///
/// Immutable once read. The pipeline/build/step references are opaque
/// metadata and are never interpreted by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub agent_query_rules: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub pipeline: PipelineRef,
    #[serde(default)]
    pub build: BuildRef,
    #[serde(default)]
    pub step: StepRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    #[serde(default)]
    pub key: String,
}

/// Normalized copy of a scheduled job, as recorded in the local ledger
///
/// Query rules are unordered tags, so they are stored sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub priority: i32,
    pub agent_query_rules: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
    pub pipeline: PipelineRef,
    pub build: BuildRef,
    pub step: StepRef,
}

impl From<&ScheduledJob> for JobSnapshot {
    fn from(job: &ScheduledJob) -> Self {
        let mut agent_query_rules: Vec<String> = job
            .agent_query_rules
            .iter()
            .map(|rule| rule.trim().to_string())
            .filter(|rule| !rule.is_empty())
            .collect();
        agent_query_rules.sort();
        agent_query_rules.dedup();

        Self {
            id: job.id,
            priority: job.priority,
            agent_query_rules,
            scheduled_at: job.scheduled_at,
            pipeline: job.pipeline.clone(),
            build: job.build.clone(),
            step: job.step.clone(),
        }
    }
}

/// A time-leased exclusive claim on a job, granted by the upstream queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub job_id: Uuid,
    pub expires_in: Duration,
}

impl Reservation {
    pub fn new(job_id: Uuid, expires_in: Duration) -> Self {
        Self { job_id, expires_in }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> ScheduledJob {
        ScheduledJob {
            id: Uuid::new_v4(),
            priority: 10,
            agent_query_rules: vec![
                "queue=default".to_string(),
                " os=linux ".to_string(),
                "queue=default".to_string(),
                String::new(),
            ],
            scheduled_at: Utc::now(),
            pipeline: PipelineRef {
                slug: "my-pipeline".to_string(),
                uuid: "pipe-123".to_string(),
            },
            build: BuildRef {
                number: 42,
                branch: "main".to_string(),
                uuid: "build-123".to_string(),
            },
            step: StepRef {
                key: "test".to_string(),
            },
        }
    }

    #[test]
    fn test_snapshot_normalizes_query_rules() {
        let job = sample_job();
        let snapshot = JobSnapshot::from(&job);

        assert_eq!(snapshot.id, job.id);
        assert_eq!(snapshot.priority, 10);
        assert_eq!(
            snapshot.agent_query_rules,
            vec!["os=linux".to_string(), "queue=default".to_string()]
        );
        assert_eq!(snapshot.pipeline, job.pipeline);
        assert_eq!(snapshot.build.number, 42);
        assert_eq!(snapshot.step.key, "test");
    }

    #[test]
    fn test_scheduled_job_minimal_json() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"id":"{}","scheduled_at":"2024-01-01T12:00:00Z"}}"#,
            id
        );
        let job: ScheduledJob = serde_json::from_str(&raw).unwrap();

        assert_eq!(job.id, id);
        assert_eq!(job.priority, 0);
        assert!(job.agent_query_rules.is_empty());
        assert_eq!(job.pipeline, PipelineRef::default());
    }
}
