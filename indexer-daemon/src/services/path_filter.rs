//! Candidate audio file predicate
//!
//! A path is a candidate when its extension is `wav` or `mp3` (any case) and the
//! directory directly containing it is named exactly `ebl`. Pure: no filesystem access.

use std::ffi::OsStr;
use std::path::Path;

/// Supported audio extensions, lowercase, without the dot
pub const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// Name the parent directory must have
pub const MARKER_DIR: &str = "ebl";

/// Decides which stable files are handed to the ingestion pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFilter;

impl PathFilter {
    pub fn new() -> Self {
        Self
    }

    /// True iff the extension is supported and the parent directory is the marker
    pub fn is_candidate(&self, path: &Path) -> bool {
        Self::has_audio_extension(path) && Self::has_marker_parent(path)
    }

    fn has_audio_extension(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
    }

    fn has_marker_parent(path: &Path) -> bool {
        path.parent()
            .and_then(Path::file_name)
            .is_some_and(|name| name == OsStr::new(MARKER_DIR))
    }
}
