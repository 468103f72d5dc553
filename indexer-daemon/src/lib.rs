//! indexer-daemon library interface
//!
//! Watches a music directory for new audio files under `ebl` folders and pushes each
//! one to the ingestion API (register, then upload). The binary is a thin wrapper
//! around `build_pipeline` + `build_watcher`; integration tests use the same entry
//! points against a local fake API.

pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod watcher;

pub use crate::error::{IngestError, UploadError, WatchError};

use indexer_common::config::ResolvedConfig;
use indexer_common::time::millis_to_duration;
use services::{HttpIngestApi, IngestionPipeline, UploadClient};
use std::sync::Arc;
use utils::RetryPolicy;
use watcher::{DirectoryWatcher, FileHandler, NotifySource};

/// Package version plus the build stamp, e.g. `0.1.0 (1a2b3c4d, release build, built ...)`
pub fn build_info() -> String {
    format!(
        "{} ({}, {} build, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("INDEXER_BUILD_ID"),
        env!("INDEXER_BUILD_PROFILE"),
        env!("INDEXER_BUILT_AT")
    )
}

/// HTTP-backed pipeline for the resolved endpoint and retry settings
pub fn build_pipeline(config: &ResolvedConfig) -> Result<IngestionPipeline, UploadError> {
    let api = HttpIngestApi::new(
        &config.api_endpoint(),
        millis_to_duration(config.upload.timeout_ms),
    )?;
    let client = UploadClient::new(Arc::new(api), RetryPolicy::from(&config.upload));
    Ok(IngestionPipeline::new(client))
}

/// Start watching `config.watch_dir`, handing stable candidates to `handler`
///
/// Must be called inside a tokio runtime. The initial scan starts as soon as the
/// root can be watched; a missing root is reported and retried, never fatal.
pub fn build_watcher(
    config: &ResolvedConfig,
    handler: Arc<dyn FileHandler>,
) -> DirectoryWatcher<NotifySource> {
    let source = NotifySource::start(
        &config.watch_dir,
        millis_to_duration(config.watch.root_retry_ms),
    );
    DirectoryWatcher::new(config.watch_dir.clone(), source, handler, &config.stability)
}
