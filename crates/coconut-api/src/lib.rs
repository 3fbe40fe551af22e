//! Coconut API Library
//!
//! This crate provides the HTTP API handlers and application setup for the
//! transcoding bridge.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
