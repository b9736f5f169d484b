//! API Module
//!
//! HTTP API layer for the node agent.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::AgentLauncher;

pub type AppState = Arc<AgentLauncher>;

/// Create the node agent router
pub fn create_router(launcher: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/job", post(job::start_job))
        .with_state(launcher)
        .layer(TraceLayer::new_for_http())
}
