use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use coconut_core::models::Output;
use coconut_core::AppError;
use coconut_storage::upload_token;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub volume: String,
    pub path: String,
    pub token: Option<String>,
}

/// Upload proxy: stores a file pushed by Coconut for a pending output.
///
/// With a notification token configured, the upload URL must carry the token
/// signed for its volume and path.
#[tracing::instrument(skip(state, query, body), fields(volume = %query.volume, path = %query.path, size_bytes = body.len()))]
pub async fn receive_upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Output>), HttpAppError> {
    if let Some(secret) = state.config.notification_token() {
        let signed = query
            .token
            .as_deref()
            .is_some_and(|token| upload_token::verify(secret, &query.volume, &query.path, token));
        if !signed {
            tracing::warn!("Upload rejected: bad or missing token");
            return Err(AppError::Unauthorized("Invalid upload token".to_string()).into());
        }
    }

    if body.is_empty() {
        return Err(AppError::InvalidInput("Upload body is empty".to_string()).into());
    }

    let output = state
        .transcoding
        .accept_upload(&query.volume, &query.path, body)
        .await?;

    Ok((StatusCode::CREATED, Json(output)))
}
