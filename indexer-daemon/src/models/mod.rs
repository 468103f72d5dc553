//! Data models for indexer-daemon
//!
//! Everything here is ephemeral: built while one file is processed and dropped after.

pub mod audio_file;

pub use audio_file::{AudioFileMetadata, FileStats, RegisteredUpload, UploadReceipt, WatchedFile};
