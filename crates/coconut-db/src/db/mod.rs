//! Database repositories for data access layer
//!
//! `transcode` holds the repository trait and the PostgreSQL implementation,
//! `memory` the in-memory implementation with the same semantics.

pub mod memory;
pub mod transcode;

pub use memory::InMemoryTranscodeRepository;
pub use transcode::{JobCreation, PgTranscodeRepository, TranscodeRepository};
