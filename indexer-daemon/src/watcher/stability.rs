//! Write-stability detection
//!
//! A created file is only considered finished once its size and mtime have stayed
//! identical for the whole threshold. Each pending path keeps the last snapshot seen
//! and the instant that snapshot was first observed; every poll either resets that
//! instant (something changed), keeps waiting, or releases the path as stable.

use async_trait::async_trait;
use indexer_common::config::StabilityConfig;
use indexer_common::time::millis_to_duration;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Size + mtime pair compared between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// What a probe found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    File(FileSnapshot),
    Directory,
    Missing,
}

/// Reads the current state of a path
#[async_trait]
pub trait FileProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> ProbeResult;
}

/// Probe backed by `tokio::fs::metadata`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl FileProbe for FsProbe {
    async fn probe(&self, path: &Path) -> ProbeResult {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => ProbeResult::Directory,
            Ok(meta) => ProbeResult::File(FileSnapshot {
                size: meta.len(),
                modified: meta.modified().ok(),
            }),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), "Stat failed while awaiting stability: {}", e);
                }
                ProbeResult::Missing
            }
        }
    }
}

/// Result of feeding one probe into the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityCheck {
    /// Still changing, or not quiet for long enough
    Pending,
    /// Quiet for the full threshold; no longer tracked
    Stable,
    /// Deleted, or not a regular file; no longer tracked
    Dropped,
}

#[derive(Debug)]
struct PendingFile {
    last: Option<FileSnapshot>,
    unchanged_since: Instant,
}

/// Per-path stability state
#[derive(Debug)]
pub struct StabilityTracker {
    threshold: Duration,
    pending: HashMap<PathBuf, PendingFile>,
}

impl StabilityTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(millis_to_duration(config.threshold_ms))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Start tracking `path`; false if it was already pending
    pub fn track(&mut self, path: PathBuf, now: Instant) -> bool {
        if self.pending.contains_key(&path) {
            return false;
        }
        self.pending.insert(
            path,
            PendingFile {
                last: None,
                unchanged_since: now,
            },
        );
        true
    }

    /// Stop tracking `path`; true if it was pending
    pub fn forget(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.keys().cloned().collect()
    }

    /// Feed the latest probe for `path`
    pub fn observe(&mut self, path: &Path, probe: ProbeResult, now: Instant) -> StabilityCheck {
        let Some(entry) = self.pending.get_mut(path) else {
            return StabilityCheck::Dropped;
        };

        let snapshot = match probe {
            ProbeResult::File(snapshot) => snapshot,
            ProbeResult::Directory | ProbeResult::Missing => {
                self.pending.remove(path);
                return StabilityCheck::Dropped;
            }
        };

        if entry.last != Some(snapshot) {
            entry.last = Some(snapshot);
            entry.unchanged_since = now;
            return StabilityCheck::Pending;
        }

        if now.duration_since(entry.unchanged_since) >= self.threshold {
            self.pending.remove(path);
            return StabilityCheck::Stable;
        }

        StabilityCheck::Pending
    }
}
