//! Coconut Storage Library
//!
//! This crate maps configured volumes to the URLs handed to the transcoding service
//! and provides the byte-level backends used to write and delete output files.
//!
//! # Volume adapters
//!
//! A [`VolumeAdapter`] turns an output path into an upload URL (where the transcoding
//! service delivers the file) and a public URL (where the file is served once ready).
//! Adapters are created by the [`AdapterRegistry`], keyed by the volume's type tag.
//!
//! # Storage keys
//!
//! Keys are relative output paths, optionally prefixed by the volume's subfolder.
//! Keys must not contain `..` segments or a leading `/`. Key handling is centralized
//! in the `keys` module so adapters and backends stay consistent.
//!
//! # Upload tokens
//!
//! When an upload secret is configured, upload proxy URLs carry a `token` signed
//! with it (see [`upload_token`]). The proxy only accepts uploads whose token
//! matches the volume and path.

pub mod adapter;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod registry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod upload_token;

// Re-export commonly used types
pub use adapter::{GenericAdapter, S3Adapter, VolumeAdapter};
pub use coconut_core::StorageBackend;
pub use factory::create_volume_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use registry::{AdapterFactory, AdapterRegistry, RegisterVolumeAdapters};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
