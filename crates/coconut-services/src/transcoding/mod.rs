//! Transcoding job lifecycle.

mod outcome;
mod service;

pub use outcome::{BatchItemError, BatchReport, ClearReport, NotificationOutcome, TranscodeOutcome};
pub use service::TranscodingService;
