use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::Json,
};
use coconut_core::models::JobResponse;
use std::sync::Arc;
use uuid::Uuid;

/// Get a job by ID
#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, HttpAppError> {
    let job = state.transcoding.get_job(job_id).await?;
    Ok(Json(job))
}

/// Cancel a job that has not reached a terminal state
#[tracing::instrument(skip(state))]
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, HttpAppError> {
    tracing::info!(job_id = %job_id, "Cancelling job");

    let job = state.transcoding.cancel_job(job_id).await?;

    tracing::info!(job_id = %job_id, "Job cancelled");
    Ok(Json(job))
}
