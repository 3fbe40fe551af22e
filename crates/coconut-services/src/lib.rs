//! Coconut Services Layer
//!
//! This crate is the business service layer: it talks to the Coconut API and
//! drives the transcoding job lifecycle on top of the repository and storage
//! crates, so that the API crate depends on a single service facade. Keep
//! business logic and coordination here; keep thin HTTP handling in coconut-api.

pub mod coconut;
pub mod transcoding;

pub use coconut::{
    CoconutClient, JobPayload, Notification, NotificationKind, RemoteError, RemoteJob,
    RemoteOutput, TranscodingApi,
};
pub use coconut_storage::{
    create_volume_storage, AdapterRegistry, RegisterVolumeAdapters, Storage, StorageError,
    StorageResult, VolumeAdapter,
};
#[cfg(feature = "storage-local")]
pub use coconut_storage::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use coconut_storage::S3Storage;
pub use transcoding::{
    BatchItemError, BatchReport, ClearReport, NotificationOutcome, TranscodeOutcome,
    TranscodingService,
};
