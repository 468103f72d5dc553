//! Event loop tying a source, the stability tracker, the path filter and the handler
//!
//! One task owns all watcher state. Each stable candidate is handed to the handler in a
//! task of its own, so a slow upload never holds up event processing. Stopping the loop
//! leaves those tasks running; `InFlightTasks` lets the caller wait for them.

use crate::error::IngestError;
use crate::services::PathFilter;
use crate::watcher::handler::FileHandler;
use crate::watcher::source::{is_hidden_name, EventSource, FsEventKind, SourceEvent};
use crate::watcher::stability::{
    FileProbe, FsProbe, ProbeResult, StabilityCheck, StabilityTracker,
};
use futures::stream::{self, StreamExt};
use indexer_common::config::StabilityConfig;
use indexer_common::time::millis_to_duration;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on stat calls issued together in one poll
const MAX_CONCURRENT_STATS: usize = 64;

/// Recursive watcher over one root directory
pub struct DirectoryWatcher<S: EventSource> {
    root: PathBuf,
    source: S,
    probe: Arc<dyn FileProbe>,
    handler: Arc<dyn FileHandler>,
    filter: PathFilter,
    tracker: StabilityTracker,
    poll_interval: Duration,
    in_flight: InFlightTasks,
}

/// One loop iteration's trigger
enum Step {
    Shutdown,
    Event(Option<SourceEvent>),
    Poll,
}

impl<S: EventSource> DirectoryWatcher<S> {
    pub fn new(
        root: PathBuf,
        source: S,
        handler: Arc<dyn FileHandler>,
        stability: &StabilityConfig,
    ) -> Self {
        Self {
            root,
            source,
            probe: Arc::new(FsProbe),
            handler,
            filter: PathFilter,
            tracker: StabilityTracker::from_config(stability),
            poll_interval: millis_to_duration(stability.poll_interval_ms.max(1)),
            in_flight: InFlightTasks::new(),
        }
    }

    /// Replace the filesystem probe used for stability checks
    pub fn with_probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Handle on the pipeline tasks this watcher has started
    pub fn in_flight(&self) -> InFlightTasks {
        self.in_flight.clone()
    }

    /// Run until `shutdown` fires or the source closes
    ///
    /// Returns the in-flight handle; tasks already started keep running.
    pub async fn run(mut self, shutdown: CancellationToken) -> InFlightTasks {
        info!(
            root = %self.root.display(),
            threshold_ms = self.tracker.threshold().as_millis() as u64,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Watching directory"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let has_pending = !self.tracker.is_empty();
            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                event = self.source.next_event() => Step::Event(event),
                _ = ticker.tick(), if has_pending => Step::Poll,
            };

            match step {
                Step::Shutdown => {
                    info!(pending = self.tracker.len(), "Watcher stopping");
                    break;
                }
                Step::Event(Some(SourceEvent::Path(path, kind))) => self.on_event(path, kind),
                Step::Event(Some(SourceEvent::Error(e))) => error!("Watcher error: {}", e),
                Step::Event(None) => {
                    warn!("Event source closed, watcher stopping");
                    break;
                }
                Step::Poll => self.poll_pending().await,
            }
        }

        self.in_flight
    }

    fn on_event(&mut self, path: PathBuf, kind: FsEventKind) {
        if self.is_hidden(&path) {
            trace!(path = %path.display(), "Ignoring hidden path");
            return;
        }

        match kind {
            FsEventKind::Created => {
                if self.tracker.track(path.clone(), Instant::now()) {
                    debug!(path = %path.display(), "Awaiting write stability");
                }
            }
            // Pending files are re-probed on every tick anyway
            FsEventKind::Modified => {
                if self.tracker.is_pending(&path) {
                    trace!(path = %path.display(), "Pending file still being written");
                }
            }
            FsEventKind::Removed => {
                if self.tracker.forget(&path) {
                    debug!(path = %path.display(), "Pending file removed before becoming stable");
                }
            }
        }
    }

    /// Stat every pending path, up to `MAX_CONCURRENT_STATS` at a time, then feed
    /// the results to the tracker
    async fn poll_pending(&mut self) {
        let probe = Arc::clone(&self.probe);
        let observed: Vec<(PathBuf, ProbeResult)> = stream::iter(self.tracker.pending_paths())
            .map(|path| {
                let probe = Arc::clone(&probe);
                async move {
                    let result = probe.probe(&path).await;
                    (path, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_STATS)
            .collect()
            .await;

        let now = Instant::now();
        for (path, result) in observed {
            match self.tracker.observe(&path, result, now) {
                StabilityCheck::Pending => {}
                StabilityCheck::Stable => self.on_stable(path),
                StabilityCheck::Dropped => {
                    debug!(path = %path.display(), "Pending path vanished or is not a file");
                }
            }
        }
    }

    fn on_stable(&self, path: PathBuf) {
        if !self.filter.is_candidate(&path) {
            trace!(path = %path.display(), "Not a candidate, skipping");
            return;
        }

        info!(path = %path.display(), "New audio file detected: {}", path.display());
        self.dispatch(path);
    }

    fn dispatch(&self, path: PathBuf) {
        let handler = Arc::clone(&self.handler);
        let in_flight = self.in_flight.clone();
        let (task_id, token) = in_flight.register(&path);

        self.in_flight.tracker.spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(IngestError::Cancelled),
                result = handler.handle(&path) => result,
            };
            in_flight.unregister(task_id);

            if let Err(e) = result {
                error!("Failed to process file {}: {}", path.display(), e);
            }
        });
    }

    /// Hidden means any component below the root starting with '.'
    fn is_hidden(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|c| match c {
            Component::Normal(name) => is_hidden_name(&name.to_string_lossy()),
            _ => false,
        })
    }
}

/// Pipeline tasks started by a watcher
///
/// Every task runs under a child of one shared token, and keeps its own token
/// registered here while it runs so a single file can be cancelled.
#[derive(Clone)]
pub struct InFlightTasks {
    tracker: TaskTracker,
    token: CancellationToken,
    running: Arc<Mutex<RunningTasks>>,
}

#[derive(Default)]
struct RunningTasks {
    next_id: u64,
    by_id: HashMap<u64, (PathBuf, CancellationToken)>,
}

impl InFlightTasks {
    fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            running: Arc::new(Mutex::new(RunningTasks::default())),
        }
    }

    fn running(&self) -> MutexGuard<'_, RunningTasks> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, path: &Path) -> (u64, CancellationToken) {
        let token = self.token.child_token();
        let mut running = self.running();
        let id = running.next_id;
        running.next_id += 1;
        running.by_id.insert(id, (path.to_path_buf(), token.clone()));
        (id, token)
    }

    fn unregister(&self, id: u64) {
        self.running().by_id.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Abort every running task; each reports `IngestError::Cancelled`
    pub fn cancel_all(&self) {
        self.token.cancel();
    }

    /// Abort the running task(s) for `path`; false if none is running
    pub fn cancel(&self, path: &Path) -> bool {
        let running = self.running();
        let mut found = false;
        for (task_path, token) in running.by_id.values() {
            if task_path == path {
                token.cancel();
                found = true;
            }
        }
        if found {
            info!(path = %path.display(), "Cancelling upload");
        }
        found
    }

    /// Wait until every started task has finished
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
