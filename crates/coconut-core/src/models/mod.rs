//! Data models for the application
//!
//! Jobs and outputs make up the transcoding lifecycle; volumes and storage
//! descriptors describe where output files end up. Request types carry
//! submissions from the HTTP layer.

mod job;
mod output;
mod request;
mod volume;

pub use job::*;
pub use output::*;
pub use request::*;
pub use volume::*;
