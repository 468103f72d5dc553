//! Directory watching
//!
//! - `source`: OS notifications and the initial scan as a stream of `(path, kind)`
//! - `stability`: size/mtime quiet-period tracking per pending path
//! - `directory_watcher`: the event loop that filters stable files and dispatches them
//! - `handler`: the per-file work seam

pub mod directory_watcher;
pub mod handler;
pub mod source;
pub mod stability;

pub use directory_watcher::{DirectoryWatcher, InFlightTasks};
pub use handler::FileHandler;
pub use source::{ChannelSource, EventSource, FsEventKind, NotifySource, SourceEvent};
pub use stability::{FileProbe, FileSnapshot, FsProbe, ProbeResult, StabilityCheck, StabilityTracker};
