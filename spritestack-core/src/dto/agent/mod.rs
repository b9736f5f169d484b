//! Node agent DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request from the controller asking a node to start an agent for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJob {
    pub job_uuid: Uuid,
}

/// Response from a node agent after accepting a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobAccepted {
    pub job_uuid: Uuid,
    pub active_agents: usize,
    pub agent_limit: usize,
}

/// Liveness response of a node agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub status: String,
    pub active_agents: usize,
    pub agent_limit: usize,
}
