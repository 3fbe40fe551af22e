//! Coconut Database Layer
//!
//! This crate provides persistence for transcoding jobs and their outputs: the
//! `TranscodeRepository` trait, a PostgreSQL implementation and an in-memory
//! implementation used when no database is configured and in tests.

// Module declarations
pub mod db;

// Re-exports: Repositories
pub use db::{InMemoryTranscodeRepository, JobCreation, PgTranscodeRepository, TranscodeRepository};
