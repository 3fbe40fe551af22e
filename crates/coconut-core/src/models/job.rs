use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle status of a transcoding job.
///
/// `starting -> processing -> completed` is the success path. Any non-terminal
/// state may move to `error` or `cancelled`. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    /// Whether a job in this status may move to `next`.
    ///
    /// Staying in a non-terminal status is allowed so progress updates apply.
    /// `starting -> completed` is allowed because short jobs may finish before
    /// any progress is reported.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Starting => true,
            JobStatus::Processing => next != JobStatus::Starting,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled => false,
        }
    }

    /// Map a status string reported by the transcoding service.
    pub fn from_remote(status: &str) -> Option<JobStatus> {
        match status {
            "job.starting" | "job.queued" | "starting" | "queued" => Some(JobStatus::Starting),
            "job.processing" | "processing" => Some(JobStatus::Processing),
            "job.completed" | "completed" => Some(JobStatus::Completed),
            "job.failed" | "job.error" | "failed" | "error" => Some(JobStatus::Error),
            "job.cancelled" | "job.canceled" | "cancelled" | "canceled" => {
                Some(JobStatus::Cancelled)
            }
            _ => None,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Starting => write!(f, "starting"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(JobStatus::Starting),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// One transcoding request submitted (or about to be submitted) to the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    /// Identifier assigned by the transcoding service. `None` while local-only.
    pub remote_id: Option<String>,
    /// Input URL handed to the transcoding service.
    pub input: String,
    pub status: JobStatus,
    /// Percentage string, e.g. "45%".
    pub progress: String,
    pub error_code: Option<String>,
    pub message: Option<String>,
    /// Credential-free storage descriptors of the requested outputs.
    pub storage_params: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(input: impl Into<String>, storage_params: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            remote_id: None,
            input: input.into(),
            status: JobStatus::Starting,
            progress: "0%".to_string(),
            error_code: None,
            message: None,
            storage_params,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.remote_id.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record the identifier assigned by the remote service. It can only be set once.
    pub fn assign_remote_id(&mut self, remote_id: impl Into<String>) -> Result<(), AppError> {
        let remote_id = remote_id.into();
        match &self.remote_id {
            Some(existing) if *existing != remote_id => Err(AppError::Conflict(format!(
                "Job {} already has remote id {}",
                self.id, existing
            ))),
            Some(_) => Ok(()),
            None => {
                self.remote_id = Some(remote_id);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == JobStatus::Completed {
            self.progress = "100%".to_string();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move the job to `error`, keeping the remote error code for the caller.
    pub fn fail(
        &mut self,
        error_code: impl Into<String>,
        message: Option<String>,
    ) -> Result<(), AppError> {
        self.transition_to(JobStatus::Error)?;
        self.error_code = Some(error_code.into());
        self.message = message;
        Ok(())
    }

    pub fn set_progress(&mut self, progress: &str) {
        self.progress = normalize_progress(progress);
        self.updated_at = Utc::now();
    }
}

/// Normalize a progress value to a percentage string ("45" -> "45%").
pub fn normalize_progress(progress: &str) -> String {
    let trimmed = progress.trim();
    if trimmed.is_empty() {
        "0%".to_string()
    } else if trimmed.ends_with('%') {
        trimmed.to_string()
    } else {
        format!("{}%", trimmed)
    }
}

/// API representation of a job with its outputs.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub remote_id: Option<String>,
    pub input: String,
    pub status: JobStatus,
    pub progress: String,
    pub error_code: Option<String>,
    pub message: Option<String>,
    /// True when the job completed but at least one output failed.
    pub completed_with_errors: bool,
    pub outputs: Vec<crate::models::Output>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResponse {
    pub fn new(job: Job, outputs: Vec<crate::models::Output>) -> Self {
        let completed_with_errors = job.status == JobStatus::Completed
            && outputs
                .iter()
                .any(|o| o.status == crate::models::OutputStatus::Errored);
        Self {
            id: job.id,
            remote_id: job.remote_id,
            input: job.input,
            status: job.status,
            progress: job.progress,
            error_code: job.error_code,
            message: job.message,
            completed_with_errors,
            outputs,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
