use crate::keys::{join_key, normalize_key};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use coconut_core::models::Volume;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

const DEFAULT_REGION: &str = "us-east-1";

/// S3 storage implementation
///
/// Keys are stored under the volume's subfolder, matching the upload URLs built by
/// [`crate::S3Adapter`].
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    subfolder: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `credentials` - Optional `(key_id, secret_key)`; falls back to the environment
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(
        bucket: String,
        region: String,
        credentials: Option<(String, String)>,
        endpoint_url: Option<String>,
        subfolder: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some((key_id, secret_key)) = credentials {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret_key);
        }

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            subfolder: subfolder.filter(|s| !s.trim_matches('/').is_empty()),
        })
    }

    /// Create the storage for an `s3` volume from its settings.
    pub fn from_volume(volume: &Volume) -> StorageResult<Self> {
        let bucket = volume.setting("bucket").ok_or_else(|| {
            StorageError::ConfigError(format!("Volume '{}' has no bucket", volume.handle))
        })?;
        let credentials = match (volume.setting("key_id"), volume.setting("secret_key")) {
            (Some(key_id), Some(secret_key)) => Some((key_id.to_string(), secret_key.to_string())),
            _ => None,
        };

        Self::new(
            bucket.to_string(),
            volume
                .setting("region")
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
            credentials,
            volume.setting("endpoint").map(str::to_string),
            volume.setting("subfolder").map(str::to_string),
        )
    }

    fn location(&self, storage_key: &str) -> StorageResult<Path> {
        let key = join_key(self.subfolder.as_deref(), &normalize_key(storage_key)?);
        Ok(Path::from(key))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, storage_key: &str, data: Bytes) -> StorageResult<()> {
        let location = self.location(storage_key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %location,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %location,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let location = self.location(storage_key)?;

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let location = self.location(storage_key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %location,
                    "S3 delete successful"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %location,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = self.location(storage_key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
