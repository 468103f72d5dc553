//! Filesystem notification sources
//!
//! A source yields `(path, kind)` items. `NotifySource` bridges the OS notification
//! backend (`notify`) and performs the initial scan; `ChannelSource` is a plain channel
//! that lets the stability logic run without real filesystem timing.

use crate::error::WatchError;
use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::{CancellationToken, DropGuard};
use walkdir::WalkDir;

/// Filesystem change relevant to the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// New file, or a file renamed/moved into the tree
    Created,
    /// Content or metadata change
    Modified,
    /// Deleted, or renamed/moved out of the tree
    Removed,
}

/// Item produced by an event source
#[derive(Debug)]
pub enum SourceEvent {
    Path(PathBuf, FsEventKind),
    /// Backend fault; reported, never fatal
    Error(WatchError),
}

/// Stream of filesystem events
#[async_trait]
pub trait EventSource: Send {
    /// Next event, `None` once the source is closed
    async fn next_event(&mut self) -> Option<SourceEvent>;
}

/// Channel-backed source
pub struct ChannelSource {
    rx: UnboundedReceiver<SourceEvent>,
}

impl ChannelSource {
    pub fn new() -> (Self, UnboundedSender<SourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }
}

/// OS-backed recursive source rooted at one directory
///
/// Dropping it stops the registration task, which drops the `notify` watcher and
/// releases the OS watch handles.
pub struct NotifySource {
    rx: UnboundedReceiver<SourceEvent>,
    _stop: DropGuard,
}

impl NotifySource {
    /// Start watching `root` recursively and queue every file already present
    ///
    /// A root that is missing or cannot be watched is reported as a
    /// `SourceEvent::Error` and retried every `retry_interval` until it can be.
    /// The watch is registered before the initial scan so nothing created in between
    /// is missed; duplicates are absorbed by the stability tracker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(root: &Path, retry_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        tokio::spawn(establish_watch(
            root.to_path_buf(),
            retry_interval,
            tx,
            stop.clone(),
        ));

        Self {
            rx,
            _stop: stop.drop_guard(),
        }
    }
}

/// Register the watch (retrying while the root is unusable), scan, then hold the
/// watcher until the source is dropped
async fn establish_watch(
    root: PathBuf,
    retry_interval: Duration,
    tx: UnboundedSender<SourceEvent>,
    stop: CancellationToken,
) {
    let mut last_error: Option<String> = None;

    let watcher = loop {
        match register_watch(&root, &tx) {
            Ok(watcher) => break watcher,
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() == Some(message.as_str()) {
                    tracing::debug!(root = %root.display(), "Watch root still unavailable: {}", message);
                } else if tx.send(SourceEvent::Error(e)).is_err() {
                    return;
                }
                last_error = Some(message);
            }
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    };

    if last_error.is_some() {
        tracing::info!(root = %root.display(), "Watch root is available, watching");
    }

    let scan_root = root.clone();
    let scan_tx = tx.clone();
    match tokio::task::spawn_blocking(move || scan_tree(&scan_root, &scan_tx)).await {
        Ok(queued) => tracing::debug!(root = %root.display(), queued, "Initial scan complete"),
        Err(e) => {
            let _ = tx.send(SourceEvent::Error(WatchError::Scan(e.to_string())));
        }
    }
    drop(tx);

    stop.cancelled().await;
    drop(watcher);
}

fn register_watch(
    root: &Path,
    tx: &UnboundedSender<SourceEvent>,
) -> Result<RecommendedWatcher, WatchError> {
    if !root.exists() {
        return Err(WatchError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }

    let callback_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => forward_event(&event, &callback_tx),
        Err(e) => {
            let _ = callback_tx.send(SourceEvent::Error(WatchError::Notify(e)));
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    Ok(watcher)
}

#[async_trait]
impl EventSource for NotifySource {
    async fn next_event(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }
}

/// Translate one notify event into source events
fn forward_event(event: &Event, tx: &UnboundedSender<SourceEvent>) {
    for (path, kind) in map_event(event) {
        // A new directory may already hold files whose own events were missed
        if kind == FsEventKind::Created && path.is_dir() {
            scan_tree(&path, tx);
            continue;
        }
        let _ = tx.send(SourceEvent::Path(path, kind));
    }
}

/// Map a notify event onto `(path, kind)` pairs
pub(crate) fn map_event(event: &Event) -> Vec<(PathBuf, FsEventKind)> {
    match &event.kind {
        EventKind::Create(_) => with_kind(&event.paths, FsEventKind::Created),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => with_kind(&event.paths, FsEventKind::Created),
            RenameMode::From => with_kind(&event.paths, FsEventKind::Removed),
            RenameMode::Both => {
                let mut mapped = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    mapped.push((from.clone(), FsEventKind::Removed));
                }
                if let Some(to) = event.paths.get(1) {
                    mapped.push((to.clone(), FsEventKind::Created));
                }
                mapped
            }
            // Backends that cannot tell the two ends apart
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        FsEventKind::Created
                    } else {
                        FsEventKind::Removed
                    };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => with_kind(&event.paths, FsEventKind::Modified),
        EventKind::Remove(_) => with_kind(&event.paths, FsEventKind::Removed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn with_kind(paths: &[PathBuf], kind: FsEventKind) -> Vec<(PathBuf, FsEventKind)> {
    paths.iter().map(|p| (p.clone(), kind)).collect()
}

/// Queue every regular file under `root` as created, skipping hidden entries
///
/// Returns how many files were queued.
fn scan_tree(root: &Path, tx: &UnboundedSender<SourceEvent>) -> usize {
    let mut queued = 0;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_name(&e.file_name().to_string_lossy()));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && tx
                        .send(SourceEvent::Path(entry.into_path(), FsEventKind::Created))
                        .is_ok()
                {
                    queued += 1;
                }
            }
            Err(e) => {
                let _ = tx.send(SourceEvent::Error(WatchError::Scan(e.to_string())));
            }
        }
    }

    queued
}

pub(crate) fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
