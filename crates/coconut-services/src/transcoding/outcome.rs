use coconut_core::models::{JobResponse, JobStatus, Output};
use serde::Serialize;
use uuid::Uuid;

/// Result of a single transcode request.
#[derive(Debug, Serialize)]
pub struct TranscodeOutcome {
    /// The submitted job; `None` when every output was already satisfied.
    pub job: Option<JobResponse>,
    /// Outputs covering the request, new and reused.
    pub outputs: Vec<Output>,
    pub reused: usize,
}

impl TranscodeOutcome {
    pub fn submitted(&self) -> bool {
        self.job.is_some()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub submitted: usize,
    pub reused: usize,
    pub failed: usize,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub input: String,
    pub error: String,
}

/// What a notification did to its job.
#[derive(Debug, Serialize)]
pub struct NotificationOutcome {
    pub job_id: Uuid,
    pub remote_id: String,
    pub event: String,
    pub status: JobStatus,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_outputs: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ClearReport {
    pub deleted_outputs: usize,
    pub removed_files: usize,
    pub pruned_jobs: u64,
}
