use coconut_core::models::JobStatus;
use coconut_core::AppError;
use serde::Deserialize;
use serde_json::Value;

/// Event posted by Coconut to the notification URL.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub job_id: String,
    pub event: String,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// Progress or status change that does not settle outputs.
    StatusChanged(JobStatus),
    JobCompleted,
    JobFailed,
    OutputCompleted,
    OutputFailed,
    Unknown(String),
}

/// One output as reported in a notification.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RemoteOutput {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteOutput {
    /// Format key the output was requested under.
    pub fn format_key(&self) -> Option<&str> {
        self.key.as_deref().or(self.format.as_deref())
    }

    pub fn is_failed(&self) -> bool {
        if self.error.is_some() {
            return true;
        }
        match self.status.as_deref() {
            Some(status) => {
                let state = status.rsplit('.').next().unwrap_or(status);
                matches!(state, "failed" | "error" | "skipped" | "aborted")
            }
            None => false,
        }
    }
}

impl Notification {
    /// Parse a raw callback body. Anything unusable is a bad request.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let notification: Notification = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Malformed notification: {}", e)))?;

        if notification.job_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Notification has no job_id".to_string(),
            ));
        }
        if notification.event.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Notification has no event".to_string(),
            ));
        }

        Ok(notification)
    }

    pub fn kind(&self) -> NotificationKind {
        match self.event.as_str() {
            "job.completed" => NotificationKind::JobCompleted,
            "job.failed" | "job.error" => NotificationKind::JobFailed,
            "output.completed" => NotificationKind::OutputCompleted,
            "output.failed" => NotificationKind::OutputFailed,
            "input.transferred" | "output.processing" => {
                NotificationKind::StatusChanged(JobStatus::Processing)
            }
            other => match JobStatus::from_remote(other) {
                Some(JobStatus::Completed) => NotificationKind::JobCompleted,
                Some(JobStatus::Error) => NotificationKind::JobFailed,
                Some(status) => NotificationKind::StatusChanged(status),
                None => NotificationKind::Unknown(other.to_string()),
            },
        }
    }

    /// Outputs carried by the event: `data.outputs` for job events, `data` itself
    /// for single-output events.
    pub fn outputs(&self) -> Vec<RemoteOutput> {
        match self.data.get("outputs") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ if self.data.get("key").is_some() || self.data.get("format").is_some() => {
                serde_json::from_value(self.data.clone())
                    .map(|output| vec![output])
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    pub fn progress(&self) -> Option<String> {
        let value = self
            .progress
            .as_ref()
            .or_else(|| self.data.get("progress"))?;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn error_code(&self) -> String {
        self.data
            .get("error_code")
            .and_then(Value::as_str)
            .unwrap_or("job_failed")
            .to_string()
    }

    pub fn error_message(&self) -> Option<String> {
        self.data
            .get("message")
            .or_else(|| self.data.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
