#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use coconut_core::models::Volume;
use std::sync::Arc;

/// Create the byte storage backend for a volume.
///
/// Only volumes of the built-in kinds have a backend; custom adapter kinds are
/// written to by the transcoding service directly.
pub async fn create_volume_storage(volume: &Volume) -> StorageResult<Arc<dyn Storage>> {
    let backend: StorageBackend = volume.kind.parse().map_err(|_| {
        StorageError::ConfigError(format!(
            "Volume '{}' of type '{}' has no storage backend",
            volume.handle, volume.kind
        ))
    })?;

    match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let storage = S3Storage::from_volume(volume)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = volume.setting("base_path").ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "Volume '{}' has no base_path setting",
                    volume.handle
                ))
            })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
