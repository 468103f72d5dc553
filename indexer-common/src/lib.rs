//! # Audio Indexer Common Library
//!
//! Shared code for the audio indexer binaries:
//! - Error types
//! - Configuration loading (environment, TOML, compiled defaults)
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
