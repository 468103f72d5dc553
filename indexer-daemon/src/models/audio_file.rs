//! Watched file and ingestion API payloads

use indexer_common::time::to_rfc3339_millis;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Filesystem stats captured for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    /// Birth time; equals `modified` where the filesystem does not record it
    pub created: SystemTime,
    pub modified: SystemTime,
}

impl FileStats {
    pub fn from_metadata(metadata: &Metadata) -> std::io::Result<Self> {
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);

        Ok(Self {
            size: metadata.len(),
            created,
            modified,
        })
    }

    /// Opaque metadata string sent to the registration endpoint
    pub fn to_metadata_json(&self) -> String {
        json!({
            "size": self.size,
            "created": to_rfc3339_millis(self.created),
            "modified": to_rfc3339_millis(self.modified),
        })
        .to_string()
    }
}

/// A candidate file being processed, identified by its path
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub stats: FileStats,
}

impl WatchedFile {
    /// Stat `path` and capture the result
    pub async fn stat(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            stats: FileStats::from_metadata(&metadata)?,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Registration request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileMetadata {
    pub file_name: String,
    pub file_path: String,
    /// Serialized `{size, created, modified}`
    pub metadata: String,
}

impl From<&WatchedFile> for AudioFileMetadata {
    fn from(file: &WatchedFile) -> Self {
        Self {
            file_name: file.file_name(),
            file_path: file.path.to_string_lossy().into_owned(),
            metadata: file.stats.to_metadata_json(),
        }
    }
}

/// Registration response
///
/// Only `id` is required; the other fields are echoed back by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUpload {
    /// Accepted as a JSON string or number
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Echoed metadata, either the string sent or a decoded object
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!("invalid upload id: {}", other))),
    }
}

impl RegisteredUpload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: None,
            file_path: None,
            metadata: None,
        }
    }
}

/// Body upload response, kept opaque
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    /// HTTP status of the successful attempt
    pub status: u16,
    /// Response body as JSON, or a JSON string if it was not JSON
    pub payload: serde_json::Value,
}

impl UploadReceipt {
    pub fn from_body(status: u16, body: &str) -> Self {
        let payload = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
        Self { status, payload }
    }
}
