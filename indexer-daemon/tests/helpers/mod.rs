//! Test Helper Utilities
//!
//! Shared utilities for testing indexer-daemon

#![allow(dead_code)]

pub mod fake_api;

pub use fake_api::{FakeApi, ReceivedPart};

use indexer_common::config::{ResolvedConfig, StabilityConfig, UploadConfig, WatchConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Config pointing at `api` with short delays suitable for tests
pub fn test_config(api: &FakeApi, watch_dir: &Path) -> ResolvedConfig {
    ResolvedConfig {
        api_url: api.base_url.clone(),
        watch_dir: watch_dir.to_path_buf(),
        log_level: "debug".to_string(),
        upload: UploadConfig {
            max_retries: 3,
            retry_delay_ms: 50,
            timeout_ms: 10_000,
        },
        stability: StabilityConfig {
            threshold_ms: 300,
            poll_interval_ms: 50,
        },
        watch: WatchConfig { root_retry_ms: 100 },
    }
}

/// Write `bytes` to `root/rel`, creating parent directories
pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Route daemon logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("indexer_daemon=debug")
        .with_test_writer()
        .try_init();
}
