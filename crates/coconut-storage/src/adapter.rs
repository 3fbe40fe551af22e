//! Volume adapters
//!
//! An adapter knows how the transcoding service should deliver a file to a volume
//! (the upload URL) and where that file is served from afterwards (the public URL).

use coconut_core::models::Volume;
use coconut_core::AssociativeValidator;
use url::Url;

use crate::keys::{join_key, join_url, normalize_key};
use crate::upload_token;
use crate::{StorageError, StorageResult};

pub const GENERIC_ADAPTER: &str = "local";
pub const S3_ADAPTER: &str = "s3";

const DEFAULT_S3_REGION: &str = "us-east-1";

pub trait VolumeAdapter: Send + Sync {
    /// Type tag of the volume this adapter serves.
    fn kind(&self) -> &str;

    /// URL the transcoding service uploads the file at `path` to.
    fn upload_url(&self, path: &str) -> StorageResult<String>;

    /// URL the file at `path` is served from once uploaded.
    fn public_url(&self, path: &str) -> StorageResult<String>;
}

/// Adapter for volumes this service writes itself.
///
/// The transcoding service uploads to this service's upload proxy, which stores the
/// file on the volume. With an upload secret, each URL carries a signed token.
#[derive(Clone)]
pub struct GenericAdapter {
    kind: String,
    handle: String,
    root_url: String,
    upload_endpoint: Url,
    upload_secret: Option<String>,
}

impl std::fmt::Debug for GenericAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericAdapter")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("root_url", &self.root_url)
            .field("upload_endpoint", &self.upload_endpoint.as_str())
            .field("signed", &self.upload_secret.is_some())
            .finish()
    }
}

impl GenericAdapter {
    pub fn new(volume: &Volume, public_base_url: &str) -> StorageResult<Self> {
        let root_url = volume
            .root_url
            .clone()
            .or_else(|| volume.setting("url").map(str::to_string))
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Volume '{}' has no root URL to serve outputs from",
                    volume.handle
                ))
            })?;

        let upload_endpoint = Url::parse(&join_url(public_base_url, "api/v1/uploads"))
            .map_err(|e| StorageError::ConfigError(format!("Invalid public base URL: {}", e)))?;

        Ok(Self {
            kind: volume.kind.clone(),
            handle: volume.handle.clone(),
            root_url,
            upload_endpoint,
            upload_secret: None,
        })
    }

    /// Sign upload URLs with `secret`.
    pub fn with_upload_secret(mut self, secret: Option<String>) -> Self {
        self.upload_secret = secret.filter(|s| !s.is_empty());
        self
    }
}

impl VolumeAdapter for GenericAdapter {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn upload_url(&self, path: &str) -> StorageResult<String> {
        let path = normalize_key(path)?;
        let mut url = self.upload_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("volume", &self.handle)
                .append_pair("path", &path);
            if let Some(secret) = &self.upload_secret {
                query.append_pair("token", &upload_token::sign(secret, &self.handle, &path)?);
            }
        }
        Ok(url.to_string())
    }

    fn public_url(&self, path: &str) -> StorageResult<String> {
        let path = normalize_key(path)?;
        Ok(join_url(&self.root_url, &path))
    }
}

/// Adapter for S3 buckets the transcoding service writes to directly.
#[derive(Clone)]
pub struct S3Adapter {
    key_id: String,
    secret_key: String,
    bucket: String,
    subfolder: Option<String>,
    public_uploads: bool,
    root_url: String,
}

impl std::fmt::Debug for S3Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Adapter")
            .field("bucket", &self.bucket)
            .field("subfolder", &self.subfolder)
            .field("public_uploads", &self.public_uploads)
            .field("root_url", &self.root_url)
            .finish_non_exhaustive()
    }
}

impl S3Adapter {
    pub fn new(volume: &Volume) -> StorageResult<Self> {
        AssociativeValidator::new()
            .required_keys(["key_id", "secret_key", "bucket"])
            .check_all_keys(true)
            .validate(&format!("Volume '{}' settings", volume.handle), &volume.settings_value())
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let required = |key: &str| {
            volume.setting(key).map(str::to_string).ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Volume '{}' setting '{}' cannot be empty",
                    volume.handle, key
                ))
            })
        };
        let key_id = required("key_id")?;
        let secret_key = required("secret_key")?;
        let bucket = required("bucket")?;

        let subfolder = volume
            .setting("subfolder")
            .map(|s| s.trim_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let base_url = volume
            .root_url
            .clone()
            .or_else(|| volume.setting("url").map(str::to_string))
            .unwrap_or_else(|| {
                let region = volume.setting("region").unwrap_or(DEFAULT_S3_REGION);
                format!("https://{}.s3.{}.amazonaws.com", bucket, region)
            });
        let root_url = match &subfolder {
            Some(subfolder) => join_url(&base_url, subfolder),
            None => base_url.trim_end_matches('/').to_string(),
        };

        Ok(Self {
            key_id,
            secret_key,
            bucket,
            subfolder,
            public_uploads: volume.flag("make_uploads_public"),
            root_url,
        })
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }
}

impl VolumeAdapter for S3Adapter {
    fn kind(&self) -> &str {
        S3_ADAPTER
    }

    fn upload_url(&self, path: &str) -> StorageResult<String> {
        let key = join_key(self.subfolder.as_deref(), &normalize_key(path)?);
        let mut url = format!(
            "s3://{}:{}@{}/{}",
            urlencoding::encode(&self.key_id),
            urlencoding::encode(&self.secret_key),
            self.bucket,
            key
        );
        if !self.public_uploads {
            url.push_str("?x-amz-acl=private");
        }
        Ok(url)
    }

    fn public_url(&self, path: &str) -> StorageResult<String> {
        let path = normalize_key(path)?;
        Ok(join_url(&self.root_url, &path))
    }
}
