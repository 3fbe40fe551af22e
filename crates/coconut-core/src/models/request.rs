use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Request to transcode one input into a set of outputs
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TranscodeRequest {
    /// URL of the video to transcode
    #[validate(url(message = "Input must be a valid URL"))]
    pub input: String,
    /// Logical source key outputs are tracked under. Defaults to the input URL.
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 2048,
        message = "Source must be between 1 and 2048 characters"
    ))]
    pub source: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Between 1 and 50 outputs are required"))]
    #[validate(nested)]
    pub outputs: Vec<OutputRequest>,
}

impl TranscodeRequest {
    pub fn new(input: impl Into<String>, outputs: Vec<OutputRequest>) -> Self {
        Self {
            input: input.into(),
            source: None,
            outputs,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.input)
    }
}

/// One desired output of a transcode request
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OutputRequest {
    /// Coconut format key, e.g. `mp4:720p`
    #[validate(length(
        min = 1,
        max = 255,
        message = "Format must be between 1 and 255 characters"
    ))]
    pub format: String,
    /// Volume handle; the default volume when omitted
    #[serde(default)]
    pub volume: Option<String>,
    /// Relative output path; derived from the source and format when omitted
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 1024,
        message = "Path must be between 1 and 1024 characters"
    ))]
    pub path: Option<String>,
    /// Extra Coconut output settings
    #[serde(default)]
    pub params: Option<Value>,
    /// Manual storage settings (`volume`, `sub_path`)
    #[serde(default)]
    pub storage: Option<Value>,
}

impl OutputRequest {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            volume: None,
            path: None,
            params: None,
            storage: None,
        }
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_storage(mut self, storage: Value) -> Self {
        self.storage = Some(storage);
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BatchTranscodeRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 items are required"))]
    pub items: Vec<TranscodeRequest>,
}
