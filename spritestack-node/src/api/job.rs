//! Job API Handlers
//!
//! HTTP endpoint the controller calls to start an agent for a reserved job.

use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use spritestack_core::dto::agent::{StartJob, StartJobAccepted};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /job
/// Start an agent that acquires the given job
pub async fn start_job(
    State(launcher): State<AppState>,
    body: Result<Json<StartJob>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StartJobAccepted>)> {
    let Json(req) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    tracing::info!("Starting agent for job: {}", req.job_uuid);

    let active_agents = launcher.launch(req.job_uuid).map_err(|e| {
        tracing::warn!("Rejected job {}: {}", req.job_uuid, e);
        ApiError::from(e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobAccepted {
            job_uuid: req.job_uuid,
            active_agents,
            agent_limit: launcher.limit(),
        }),
    ))
}
