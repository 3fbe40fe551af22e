//! Configuration module
//!
//! Settings are read from the environment (optionally seeded from a `.env` file) and
//! validated once at startup. Legacy or alternative property names are canonicalised
//! through static alias tables, both for environment variables and for the settings
//! of volumes loaded from the volumes file.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value};

use crate::models::{Volume, VolumeSet};

// Common constants
const DEFAULT_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const COCONUT_API_URL: &str = "https://api.coconut.co/v2";
const COCONUT_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_MB: usize = 2048;
const LOCAL_STORAGE_PATH: &str = "./data/outputs";
const DEFAULT_LOCAL_VOLUME: &str = "local";

/// Environment variable aliases: `(alias, canonical)`.
pub const ENV_ALIASES: &[(&str, &str)] = &[
    ("APP_ENV", "ENVIRONMENT"),
    ("COCONUT_KEY", "COCONUT_API_KEY"),
    ("COCONUT_ENDPOINT", "COCONUT_API_URL"),
    ("BASE_URL", "PUBLIC_BASE_URL"),
    ("VOLUMES_FILE", "VOLUMES_CONFIG_PATH"),
];

/// Volume setting aliases: `(alias, canonical)`.
pub const VOLUME_SETTING_ALIASES: &[(&str, &str)] = &[
    ("keyId", "key_id"),
    ("accessKey", "key_id"),
    ("access_key", "key_id"),
    ("secret", "secret_key"),
    ("secretKey", "secret_key"),
    ("makeUploadsPublic", "make_uploads_public"),
    ("subFolder", "subfolder"),
    ("bucketName", "bucket"),
    ("path", "base_path"),
];

/// Lookup table from alias to canonical property name.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: HashMap<&'static str, &'static str>,
}

impl AliasTable {
    pub fn new(pairs: &[(&'static str, &'static str)]) -> Self {
        Self {
            aliases: pairs.iter().copied().collect(),
        }
    }

    pub fn canonical<'a>(&self, name: &'a str) -> &'a str {
        self.aliases.get(name).copied().unwrap_or(name)
    }

    /// Aliases that map to `canonical`, sorted.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&'static str> {
        let mut aliases: Vec<&'static str> = self
            .aliases
            .iter()
            .filter(|(_, target)| **target == canonical)
            .map(|(alias, _)| *alias)
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Rewrite the keys of `settings` to their canonical names.
    ///
    /// A canonical key that is already present wins over its aliases.
    pub fn canonicalize(&self, settings: Map<String, Value>) -> Map<String, Value> {
        let mut canonical = Map::with_capacity(settings.len());
        let mut aliased = Vec::new();
        for (key, value) in settings {
            let name = self.canonical(&key).to_string();
            if name == key {
                canonical.insert(name, value);
            } else {
                aliased.push((name, value));
            }
        }
        for (name, value) in aliased {
            canonical.entry(name).or_insert(value);
        }
        canonical
    }
}

/// Reads a canonical property, falling back to any of its aliases.
struct EnvReader<F> {
    lookup: F,
    aliases: AliasTable,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .or_else(|| {
                self.aliases
                    .aliases_of(key)
                    .into_iter()
                    .find_map(|alias| (self.lookup)(alias))
            })
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, anyhow::Error> {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, value)),
            None => Ok(default),
        }
    }
}

/// Base configuration shared by the HTTP server
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
}

/// Transcoding service configuration
#[derive(Clone, Debug)]
pub struct TranscoderConfig {
    pub base: BaseConfig,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub coconut_api_key: String,
    pub coconut_api_url: String,
    pub coconut_timeout_seconds: u64,
    /// Externally reachable base URL of this service, used for callbacks and upload URLs.
    pub public_base_url: String,
    pub notification_token: Option<String>,
    pub volumes_config_path: Option<String>,
    pub default_volume: Option<String>,
    pub local_storage_path: String,
    pub local_storage_base_url: Option<String>,
    pub max_upload_size_bytes: usize,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<TranscoderConfig>);

impl Config {
    fn as_transcoder(&self) -> &TranscoderConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_transcoder().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = TranscoderConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = TranscoderConfig::from_lookup(lookup)?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_transcoder().validate()
    }

    /// Load the configured volumes.
    ///
    /// Without a volumes file a single local volume is configured, rooted at
    /// `LOCAL_STORAGE_PATH` and served under `{PUBLIC_BASE_URL}/files`.
    pub fn load_volumes(&self) -> Result<VolumeSet, anyhow::Error> {
        let cfg = self.as_transcoder();
        let volumes = match &cfg.volumes_config_path {
            Some(path) => read_volumes_file(Path::new(path))?,
            None => vec![self.default_local_volume()],
        };

        let default = cfg.default_volume.clone().or_else(|| {
            if volumes.len() == 1 {
                volumes.first().map(|v| v.handle.clone())
            } else {
                None
            }
        });

        VolumeSet::new(volumes, default).map_err(|e| anyhow::anyhow!(e.to_string()))
    }

    fn default_local_volume(&self) -> Volume {
        let cfg = self.as_transcoder();
        Volume::new(DEFAULT_LOCAL_VOLUME, "local")
            .with_root_url(self.local_storage_base_url())
            .with_setting("base_path", cfg.local_storage_path.clone())
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.as_transcoder().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_transcoder().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_transcoder().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_transcoder().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_transcoder().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> Option<&str> {
        self.as_transcoder().database_url.as_deref()
    }

    pub fn coconut_api_key(&self) -> &str {
        &self.as_transcoder().coconut_api_key
    }

    pub fn coconut_api_url(&self) -> &str {
        &self.as_transcoder().coconut_api_url
    }

    pub fn coconut_timeout_seconds(&self) -> u64 {
        self.as_transcoder().coconut_timeout_seconds
    }

    pub fn public_base_url(&self) -> &str {
        &self.as_transcoder().public_base_url
    }

    /// Callback URL handed to the transcoding service.
    pub fn notification_url(&self) -> String {
        let base = format!("{}/api/v1/notifications", self.public_base_url());
        match self.notification_token() {
            Some(token) => format!("{}?token={}", base, urlencoding::encode(token)),
            None => base,
        }
    }

    pub fn notification_token(&self) -> Option<&str> {
        self.as_transcoder().notification_token.as_deref()
    }

    pub fn default_volume(&self) -> Option<&str> {
        self.as_transcoder().default_volume.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.as_transcoder().local_storage_path
    }

    pub fn local_storage_base_url(&self) -> String {
        self.as_transcoder()
            .local_storage_base_url
            .clone()
            .unwrap_or_else(|| format!("{}/files", self.public_base_url()))
    }

    /// Whether outputs of the default local volume are served by this service.
    pub fn serves_local_files(&self) -> bool {
        self.as_transcoder().volumes_config_path.is_none()
            && self.as_transcoder().local_storage_base_url.is_none()
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.as_transcoder().max_upload_size_bytes
    }
}

impl TranscoderConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader {
            lookup,
            aliases: AliasTable::new(ENV_ALIASES),
        };

        let environment = reader
            .get("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string());

        let cors_origins: Vec<String> = reader
            .get("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: reader.parse_or("PORT", DEFAULT_PORT)?,
            cors_origins,
            db_max_connections: reader.parse_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: reader.parse_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            environment,
        };

        let public_base_url = reader
            .get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", base.server_port))
            .trim_end_matches('/')
            .to_string();

        let max_upload_size_mb: usize = reader.parse_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB)?;

        let config = TranscoderConfig {
            base,
            database_url: reader.get("DATABASE_URL"),
            coconut_api_key: reader
                .get("COCONUT_API_KEY")
                .context("COCONUT_API_KEY must be set")?,
            coconut_api_url: reader
                .get("COCONUT_API_URL")
                .unwrap_or_else(|| COCONUT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            coconut_timeout_seconds: reader
                .parse_or("COCONUT_TIMEOUT_SECONDS", COCONUT_TIMEOUT_SECS)?,
            public_base_url,
            notification_token: reader.get("NOTIFICATION_TOKEN"),
            volumes_config_path: reader.get("VOLUMES_CONFIG_PATH"),
            default_volume: reader.get("DEFAULT_VOLUME"),
            local_storage_path: reader
                .get("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: reader
                .get("LOCAL_STORAGE_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string()),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let is_production = matches!(
            self.base.environment.to_lowercase().as_str(),
            "production" | "prod"
        );

        if is_production && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if let Some(database_url) = &self.database_url {
            if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://")
            {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        for (key, value) in [
            ("PUBLIC_BASE_URL", &self.public_base_url),
            ("COCONUT_API_URL", &self.coconut_api_url),
        ] {
            url::Url::parse(value)
                .with_context(|| format!("{} must be an absolute URL, got '{}'", key, value))?;
        }

        if is_production && self.notification_token.is_none() {
            return Err(anyhow::anyhow!(
                "NOTIFICATION_TOKEN must be set in production"
            ));
        }

        if self.coconut_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "COCONUT_TIMEOUT_SECONDS must be greater than 0"
            ));
        }

        Ok(())
    }
}

/// Read volumes from a JSON file: either a list of volumes or `{"volumes": [...]}`.
pub fn read_volumes_file(path: &Path) -> Result<Vec<Volume>, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read volumes file {}", path.display()))?;
    parse_volumes(&raw).with_context(|| format!("Invalid volumes file {}", path.display()))
}

pub fn parse_volumes(raw: &str) -> Result<Vec<Volume>, anyhow::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("volumes") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow::anyhow!("expected a 'volumes' array")),
        },
        _ => return Err(anyhow::anyhow!("expected an array of volumes")),
    };

    let aliases = AliasTable::new(VOLUME_SETTING_ALIASES);
    list.into_iter()
        .map(|item| {
            let mut volume: Volume = serde_json::from_value(item)?;
            volume.settings = aliases.canonicalize(std::mem::take(&mut volume.settings));
            Ok(volume)
        })
        .collect()
}
