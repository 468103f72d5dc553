//! Service modules for the watch-register-upload pipeline
//!
//! - `path_filter`: which stable files are candidates
//! - `upload_client`: the two ingestion API calls, retry around the body upload
//! - `pipeline`: per-file orchestration

pub mod path_filter;
pub mod pipeline;
pub mod upload_client;

pub use path_filter::{PathFilter, AUDIO_EXTENSIONS, MARKER_DIR};
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use upload_client::{HttpIngestApi, IngestApi, UploadClient};
