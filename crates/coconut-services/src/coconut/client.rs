use anyhow::Context;
use async_trait::async_trait;
use coconut_core::AppError;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use super::payload::{JobPayload, RemoteJob};

/// Failure talking to the transcoding service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never got an answer (connection, timeout, 5xx).
    #[error("Transcoding service unreachable: {0}")]
    Unreachable(String),

    /// The service answered and refused the job.
    #[error("Transcoding service rejected the job ({status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected response from transcoding service: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Error code stored on the failed job.
    pub fn error_code(&self) -> &str {
        match self {
            RemoteError::Unreachable(_) => "remote_unavailable",
            RemoteError::Rejected { code, .. } => code,
            RemoteError::InvalidResponse(_) => "invalid_response",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RemoteError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unreachable(message) => AppError::RemoteUnavailable(message),
            RemoteError::InvalidResponse(message) => AppError::RemoteUnavailable(message),
            RemoteError::Rejected {
                status,
                code,
                message,
            } => AppError::RemoteRejected {
                status,
                code,
                message,
            },
        }
    }
}

/// Outbound side of the transcoding service.
#[async_trait]
pub trait TranscodingApi: Send + Sync {
    async fn create_job(&self, payload: &JobPayload) -> Result<RemoteJob, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Coconut v2 API.
pub struct CoconutClient {
    http_client: Client,
    api_url: String,
    api_key: String,
}

impl Debug for CoconutClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CoconutClient")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl CoconutClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client for Coconut")?;

        Ok(Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.api_url)
    }
}

#[async_trait]
impl TranscodingApi for CoconutClient {
    #[tracing::instrument(skip(self, payload), fields(input = %payload.input.url, outputs = payload.output_count()))]
    async fn create_job(&self, payload: &JobPayload) -> Result<RemoteJob, RemoteError> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(self.jobs_url())
            .basic_auth(&self.api_key, None::<&str>)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    error = %e,
                    timeout = e.is_timeout(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Coconut request failed"
                );
                RemoteError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(status = status.as_u16(), "Coconut answered with a server error");
            return Err(RemoteError::Unreachable(format!("{} - {}", status, error_text)));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let body: Option<ErrorBody> = serde_json::from_str(&error_text).ok();
            let (code, message) = match body {
                Some(body) => (
                    body.error_code
                        .unwrap_or_else(|| format!("http_{}", status.as_u16())),
                    body.message.unwrap_or(error_text),
                ),
                None => (format!("http_{}", status.as_u16()), error_text),
            };

            tracing::warn!(
                status = status.as_u16(),
                error_code = %code,
                "Coconut rejected job"
            );
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let job: RemoteJob = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            remote_id = %job.id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Coconut job created"
        );

        Ok(job)
    }
}
