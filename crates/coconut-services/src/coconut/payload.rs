use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /jobs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobPayload {
    pub input: InputSpec,
    pub notification: NotificationSpec,
    /// Format key -> output settings (`url` plus the caller's params).
    pub outputs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputSpec {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub events: bool,
    pub metadata: bool,
}

impl NotificationSpec {
    /// HTTP callback receiving every event along with output metadata.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: "http".to_string(),
            url: url.into(),
            events: true,
            metadata: true,
        }
    }
}

impl JobPayload {
    pub fn new(input: impl Into<String>, notification_url: impl Into<String>) -> Self {
        Self {
            input: InputSpec { url: input.into() },
            notification: NotificationSpec::http(notification_url),
            outputs: Map::new(),
        }
    }

    /// Add an output. Params are merged after `url`, which they may not override.
    pub fn add_output(&mut self, format: &str, upload_url: &str, params: Option<&Map<String, Value>>) {
        let mut settings = Map::new();
        if let Some(params) = params {
            for (key, value) in params {
                settings.insert(key.clone(), value.clone());
            }
        }
        settings.insert("url".to_string(), Value::String(upload_url.to_string()));
        self.outputs.insert(format.to_string(), Value::Object(settings));
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

/// Job as acknowledged by Coconut.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteJob {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
}
