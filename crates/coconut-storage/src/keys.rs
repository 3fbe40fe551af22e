//! Shared key handling for adapters and storage backends.
//!
//! A key is a relative, `/`-separated path without empty, `.` or `..` segments.

use crate::{StorageError, StorageResult};

/// Normalize an output path into a storage key.
///
/// Leading, trailing and repeated slashes are dropped. Traversal segments and
/// backslashes are rejected.
pub fn normalize_key(path: &str) -> StorageResult<String> {
    if path.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            path
        )));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(StorageError::InvalidKey(format!(
                    "Storage key contains a relative segment: {}",
                    path
                )))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }

    Ok(segments.join("/"))
}

/// Prefix a key with an optional subfolder.
pub fn join_key(prefix: Option<&str>, key: &str) -> String {
    let key = key.trim_matches('/');
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, key),
        None => key.to_string(),
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_matches('/'))
}
