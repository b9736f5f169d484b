//! Health Check API Handler
//!
//! Liveness endpoint probed by the controller before every dispatch.

use axum::{Json, extract::State};
use spritestack_core::dto::agent::NodeStatus;

use crate::api::AppState;

/// GET /health
/// Always 200 while the agent is serving; reports current agent usage
pub async fn health_check(State(launcher): State<AppState>) -> Json<NodeStatus> {
    Json(NodeStatus {
        status: "ok".to_string(),
        active_agents: launcher.active(),
        agent_limit: launcher.limit(),
    })
}
