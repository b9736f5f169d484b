//! Upstream queue (stacks API) DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::job::ScheduledJob;

/// Request to register a stack with the upstream queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterStack {
    pub key: String,
    #[serde(rename = "type")]
    pub stack_type: String,
    pub queue_key: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RegisterStack {
    pub fn custom(key: impl Into<String>, queue_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stack_type: "custom".to_string(),
            queue_key: queue_key.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A registered stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    pub key: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Query parameters for one page of scheduled jobs
#[derive(Debug, Clone, Serialize)]
pub struct ListScheduledJobs {
    pub queue_key: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One page of scheduled jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobsPage {
    #[serde(default)]
    pub jobs: Vec<ScheduledJob>,
    pub cluster_queue: ClusterQueue,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterQueue {
    pub key: String,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// Request to reserve a batch of jobs under a lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReserveJobs {
    pub job_uuids: Vec<Uuid>,
    pub reservation_expiry_seconds: u64,
}

/// Disjoint partition of a reservation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReserveResult {
    #[serde(default)]
    pub reserved: Vec<Uuid>,
    #[serde(default)]
    pub not_reserved: Vec<Uuid>,
}

/// Request to report the outcome of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishJob {
    pub exit_status: i32,
    pub detail: String,
}
