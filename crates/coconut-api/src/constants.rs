//! API constants

/// Versioned prefix all routes are nested under. The notification URL handed to
/// Coconut is built against the same prefix.
pub const API_PREFIX: &str = "/api/v1";

/// Path where the default local volume is served when no CDN is configured.
pub const FILES_PATH: &str = "/files";
