use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::AppError;

/// A configured storage destination for output files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    pub handle: String,
    /// Adapter type tag, e.g. `local` or `s3`.
    pub kind: String,
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Volume {
    pub fn new(handle: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            kind: kind.into(),
            root_url: None,
            settings: Map::new(),
        }
    }

    pub fn with_root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = Some(root_url.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// String setting, `None` when absent or blank.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Boolean setting; accepts JSON booleans and "true"/"1" strings.
    pub fn flag(&self, key: &str) -> bool {
        match self.settings.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    pub fn settings_value(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}

/// The set of volumes known to the service, with an optional default.
#[derive(Debug, Clone, Default)]
pub struct VolumeSet {
    volumes: HashMap<String, Volume>,
    default_handle: Option<String>,
}

impl VolumeSet {
    pub fn new(volumes: Vec<Volume>, default_handle: Option<String>) -> Result<Self, AppError> {
        let mut map = HashMap::with_capacity(volumes.len());
        for volume in volumes {
            if volume.handle.trim().is_empty() {
                return Err(AppError::Configuration(
                    "Volume handle cannot be empty".to_string(),
                ));
            }
            if map.contains_key(&volume.handle) {
                return Err(AppError::Configuration(format!(
                    "Duplicate volume handle: {}",
                    volume.handle
                )));
            }
            map.insert(volume.handle.clone(), volume);
        }

        if let Some(default) = &default_handle {
            if !map.contains_key(default) {
                return Err(AppError::Configuration(format!(
                    "Default volume '{}' is not configured",
                    default
                )));
            }
        }

        Ok(Self {
            volumes: map,
            default_handle,
        })
    }

    pub fn get(&self, handle: &str) -> Option<&Volume> {
        self.volumes.get(handle)
    }

    /// Look up `handle`, falling back to the default volume when none is given.
    pub fn resolve(&self, handle: Option<&str>) -> Result<&Volume, AppError> {
        match handle.or(self.default_handle.as_deref()) {
            Some(handle) => self
                .get(handle)
                .ok_or_else(|| AppError::InvalidInput(format!("Unknown volume: {}", handle))),
            None => Err(AppError::InvalidInput(
                "No volume given and no default volume configured".to_string(),
            )),
        }
    }

    pub fn default_handle(&self) -> Option<&str> {
        self.default_handle.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Where an output lives. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageDescriptor {
    pub volume: String,
    #[serde(default)]
    pub sub_path: Option<String>,
    #[serde(default)]
    pub public: bool,
    pub adapter: String,
}

impl StorageDescriptor {
    pub fn for_volume(volume: &Volume, sub_path: Option<String>) -> Self {
        Self {
            volume: volume.handle.clone(),
            sub_path,
            public: volume.kind != "s3" || volume.flag("make_uploads_public"),
            adapter: volume.kind.clone(),
        }
    }
}
