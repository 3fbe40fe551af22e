use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::StorageDescriptor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    Pending,
    Ready,
    Errored,
}

impl Display for OutputStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutputStatus::Pending => write!(f, "pending"),
            OutputStatus::Ready => write!(f, "ready"),
            OutputStatus::Errored => write!(f, "errored"),
        }
    }
}

impl FromStr for OutputStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutputStatus::Pending),
            "ready" => Ok(OutputStatus::Ready),
            "errored" => Ok(OutputStatus::Errored),
            _ => Err(anyhow::anyhow!("Invalid output status: {}", s)),
        }
    }
}

/// One requested format of a source, stored at `path` on a volume.
///
/// Outputs are logically keyed by `(source, format)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Output {
    pub id: Uuid,
    pub job_id: Uuid,
    pub source: String,
    pub format: String,
    pub storage: StorageDescriptor,
    pub path: String,
    /// Public URL, set once the output is ready.
    pub url: Option<String>,
    pub status: OutputStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Output {
    pub fn new(
        job_id: Uuid,
        source: impl Into<String>,
        format: impl Into<String>,
        storage: StorageDescriptor,
        path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            source: source.into(),
            format: format.into(),
            storage,
            path: path.into(),
            url: None,
            status: OutputStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn volume(&self) -> &str {
        &self.storage.volume
    }

    /// Ready and pending outputs satisfy a new request for the same `(source, format)`.
    pub fn is_reusable(&self) -> bool {
        self.status != OutputStatus::Errored
    }

    pub fn mark_ready(&mut self, url: impl Into<String>) {
        self.status = OutputStatus::Ready;
        self.url = Some(url.into());
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_errored(&mut self, error: impl Into<String>) {
        self.status = OutputStatus::Errored;
        self.url = None;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

/// File extension for a format key such as `mp4:720p`, `webm`, `jpg:300x` or `hls`.
pub fn format_extension(format: &str) -> &str {
    let container = format.split(':').next().unwrap_or(format);
    match container {
        "hls" | "httpstream" => "m3u8",
        "dash" => "mpd",
        "" => "bin",
        other => other,
    }
}

/// Hex characters of the source digest kept in default output paths.
const SOURCE_DIGEST_LEN: usize = 8;

/// Default relative path of an output: `{source stem}-{source digest}/{format slug}.{extension}`.
///
/// The digest is the start of the SHA-256 of the full source, so two sources
/// with the same file name never share a directory.
/// `https://cdn.example.com/videos/intro.mov` with `mp4:720p` gives
/// `intro-xxxxxxxx/mp4-720p.mp4`.
pub fn default_output_path(source: &str, format: &str) -> String {
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    let file_name = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query);
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let stem = if stem.is_empty() { "output" } else { stem };

    let slug: String = format
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    format!(
        "{}-{}/{}.{}",
        stem,
        source_digest(source),
        slug,
        format_extension(format)
    )
}

fn source_digest(source: &str) -> String {
    let mut digest = hex::encode(Sha256::digest(source.as_bytes()));
    digest.truncate(SOURCE_DIGEST_LEN);
    digest
}
