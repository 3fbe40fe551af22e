//! Coconut.co API integration: the outbound job client, the job payload and
//! the inbound notification format.

mod client;
mod notification;
mod payload;

pub use client::{CoconutClient, RemoteError, TranscodingApi};
pub use notification::{Notification, NotificationKind, RemoteOutput};
pub use payload::{InputSpec, JobPayload, NotificationSpec, RemoteJob};
