//! Validation of loosely-typed key/value configuration blocks.
//!
//! Output params and storage params arrive as free-form JSON. Before they are
//! forwarded to the transcoding service they must be objects (not arrays or
//! scalars) and may be constrained on which keys they carry.
//!
//! Checks run in a fixed order: required keys, then forbidden keys, then allowed
//! keys. The first failing check ends validation. With `check_all_keys` disabled a
//! failure names only the first offending key; with it enabled every offending key
//! of that check is reported at once.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociativeError {
    #[error("{attribute} must be an associative array")]
    NotAssociative { attribute: String },

    #[error("{attribute} is missing required key(s): {}", keys.join(", "))]
    MissingKeys { attribute: String, keys: Vec<String> },

    #[error("{attribute} contains forbidden key(s): {}", keys.join(", "))]
    ForbiddenKeys { attribute: String, keys: Vec<String> },

    #[error("{attribute} contains key(s) that are not allowed: {}", keys.join(", "))]
    KeysNotAllowed { attribute: String, keys: Vec<String> },
}

impl AssociativeError {
    /// Keys named by the failure (empty for a type mismatch).
    pub fn keys(&self) -> &[String] {
        match self {
            AssociativeError::NotAssociative { .. } => &[],
            AssociativeError::MissingKeys { keys, .. }
            | AssociativeError::ForbiddenKeys { keys, .. }
            | AssociativeError::KeysNotAllowed { keys, .. } => keys,
        }
    }
}

/// Validator for associative (string-keyed) configuration values.
#[derive(Debug, Clone, Default)]
pub struct AssociativeValidator {
    required_keys: Vec<String>,
    forbidden_keys: Vec<String>,
    allowed_keys: Option<Vec<String>>,
    check_all_keys: bool,
}

impl AssociativeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn forbidden_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn check_all_keys(mut self, check_all_keys: bool) -> Self {
        self.check_all_keys = check_all_keys;
        self
    }

    /// Validate `value`, naming it `attribute` in failure messages.
    pub fn validate(&self, attribute: &str, value: &Value) -> Result<(), AssociativeError> {
        let map = value
            .as_object()
            .ok_or_else(|| AssociativeError::NotAssociative {
                attribute: attribute.to_string(),
            })?;

        let missing = self.collect(
            self.required_keys
                .iter()
                .filter(|key| !map.contains_key(key.as_str())),
        );
        if !missing.is_empty() {
            return Err(AssociativeError::MissingKeys {
                attribute: attribute.to_string(),
                keys: missing,
            });
        }

        let forbidden = self.collect(
            self.forbidden_keys
                .iter()
                .filter(|key| map.contains_key(key.as_str())),
        );
        if !forbidden.is_empty() {
            return Err(AssociativeError::ForbiddenKeys {
                attribute: attribute.to_string(),
                keys: forbidden,
            });
        }

        if let Some(allowed) = &self.allowed_keys {
            let not_allowed = self.collect(map.keys().filter(|key| !allowed.contains(key)));
            if !not_allowed.is_empty() {
                return Err(AssociativeError::KeysNotAllowed {
                    attribute: attribute.to_string(),
                    keys: not_allowed,
                });
            }
        }

        Ok(())
    }

    fn collect<'a>(&self, offending: impl Iterator<Item = &'a String>) -> Vec<String> {
        if self.check_all_keys {
            offending.cloned().collect()
        } else {
            offending.take(1).cloned().collect()
        }
    }
}
