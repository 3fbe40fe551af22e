use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use coconut_core::AppError;
use coconut_services::ClearReport;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub source: String,
}

impl SourceQuery {
    fn source(&self) -> Result<&str, AppError> {
        let source = self.source.trim();
        if source.is_empty() {
            return Err(AppError::InvalidInput("source must not be empty".to_string()));
        }
        Ok(source)
    }
}

/// List every output recorded for a source
#[tracing::instrument(skip(state))]
pub async fn list_outputs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    let source = query.source()?;
    let outputs = state.transcoding.outputs_for_source(source).await?;

    Ok(Json(serde_json::json!({
        "source": source,
        "outputs": outputs,
        "count": outputs.len()
    })))
}

/// Delete the outputs of a source along with their files
#[tracing::instrument(skip(state))]
pub async fn clear_outputs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<ClearReport>, HttpAppError> {
    let source = query.source()?;
    let report = state.transcoding.clear_source_outputs(source).await?;

    tracing::info!(
        source = %source,
        deleted_outputs = report.deleted_outputs,
        removed_files = report.removed_files,
        pruned_jobs = report.pruned_jobs,
        "Source outputs cleared"
    );

    Ok(Json(report))
}
