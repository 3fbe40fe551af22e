pub mod jobs;
pub mod notifications;
pub mod outputs;
pub mod transcode;
pub mod uploads;
