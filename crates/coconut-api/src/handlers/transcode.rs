use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use coconut_core::models::{BatchTranscodeRequest, TranscodeRequest};
use coconut_services::{BatchReport, TranscodeOutcome};
use std::sync::Arc;

/// Submit a transcoding request.
///
/// Answers 201 when a job was created and 200 when every output already existed.
#[tracing::instrument(skip(state, request), fields(input = %request.input, outputs = request.outputs.len()))]
pub async fn transcode(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<TranscodeRequest>,
) -> Result<(StatusCode, Json<TranscodeOutcome>), HttpAppError> {
    let outcome = state.transcoding.transcode(&request).await?;

    let status = if outcome.submitted() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// Submit many transcoding requests; individual failures are reported, not raised.
#[tracing::instrument(skip(state, request), fields(items = request.items.len()))]
pub async fn transcode_batch(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<BatchTranscodeRequest>,
) -> Result<Json<BatchReport>, HttpAppError> {
    let report = state.transcoding.transcode_batch(&request).await?;

    tracing::info!(
        submitted = report.submitted,
        reused = report.reused,
        failed = report.failed,
        "Batch processed"
    );

    Ok(Json(report))
}
