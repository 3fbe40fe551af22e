use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
};
use coconut_core::AppError;
use coconut_services::{Notification, NotificationOutcome};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub token: Option<String>,
}

/// Receive a job notification from Coconut.
///
/// Stale or unrecognised events are acknowledged with `applied: false` so the
/// sender does not retry them.
#[tracing::instrument(skip(state, query, body), fields(size_bytes = body.len()))]
pub async fn receive_notification(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
    body: Bytes,
) -> Result<Json<NotificationOutcome>, HttpAppError> {
    if let Some(expected) = state.config.notification_token() {
        if query.token.as_deref() != Some(expected) {
            tracing::warn!("Notification rejected: bad or missing token");
            return Err(AppError::Unauthorized("Invalid notification token".to_string()).into());
        }
    }

    let notification = Notification::parse(&body)?;
    tracing::debug!(
        remote_id = %notification.job_id,
        event = %notification.event,
        "Notification received"
    );

    let outcome = state.transcoding.handle_notification(&notification).await?;
    Ok(Json(outcome))
}
