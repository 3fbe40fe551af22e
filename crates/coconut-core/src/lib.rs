//! Coconut Core Library
//!
//! This crate provides the domain models, error types, configuration, event hooks
//! and validation shared by every Coconut Bridge component.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, TranscoderConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use events::{Cancellable, Hook, TranscodingEvents};
pub use storage_types::StorageBackend;
pub use validation::{AssociativeError, AssociativeValidator};
