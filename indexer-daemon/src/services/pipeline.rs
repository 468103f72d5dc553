//! Per-file ingestion pipeline
//!
//! stat → build metadata → register → upload → log. Steps run strictly in order for
//! one file; independent files run in independent tasks.
//!
//! A registration that succeeds followed by an upload that fails permanently leaves
//! the registration orphaned on the server. No compensating call is made.

use crate::error::{IngestError, UploadError};
use crate::models::{AudioFileMetadata, UploadReceipt, WatchedFile};
use crate::services::upload_client::UploadClient;
use crate::watcher::FileHandler;
use async_trait::async_trait;
use std::path::Path;
use tracing::{error, info};

/// Outcome of one successful pipeline run
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    pub file_name: String,
    pub receipt: UploadReceipt,
}

/// Registers and uploads one candidate file
#[derive(Clone)]
pub struct IngestionPipeline {
    client: UploadClient,
}

impl IngestionPipeline {
    pub fn new(client: UploadClient) -> Self {
        Self { client }
    }

    /// Process one candidate path
    ///
    /// Failures are logged here with whatever detail they carry and returned to the
    /// caller, which only needs to report that the file failed.
    pub async fn process(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let result = self.run(path).await;
        if let Err(e) = &result {
            log_failure(path, e);
        }
        result
    }

    async fn run(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        // Step 1: stat
        let file = WatchedFile::stat(path).await.map_err(|source| IngestError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        // Step 2: metadata
        let metadata = AudioFileMetadata::from(&file);
        let file_name = metadata.file_name.clone();

        // Step 3: register (single attempt)
        let registered = self
            .client
            .register(&metadata)
            .await
            .map_err(IngestError::Registration)?;
        info!(id = %registered.id, "Upload initialized for: {}", file_name);

        // Step 4: upload (retried inside the client)
        let receipt = self
            .client
            .upload(&registered.id, path)
            .await
            .map_err(|exhausted| IngestError::UploadFailed {
                id: registered.id.clone(),
                attempts: exhausted.attempts,
                source: exhausted.error,
            })?;

        // Step 5: done
        info!(
            id = %registered.id,
            size = file.stats.size,
            "Completed upload process for: {}",
            file_name
        );

        Ok(IngestOutcome {
            id: registered.id,
            file_name,
            receipt,
        })
    }
}

#[async_trait]
impl FileHandler for IngestionPipeline {
    async fn handle(&self, path: &Path) -> Result<(), IngestError> {
        self.process(path).await.map(|_| ())
    }
}

fn log_failure(path: &Path, err: &IngestError) {
    error!(path = %path.display(), "Upload process failed: {}", err);

    if let Some(UploadError::Api { status, body }) = err.upload_error() {
        error!(status, body = %body, "Response error details");
    }
}
