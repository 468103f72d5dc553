use crate::error::IngestError;
use async_trait::async_trait;
use std::path::Path;

/// Work performed for each stable candidate file
///
/// Called from its own task; a failure only affects that one file.
#[async_trait]
pub trait FileHandler: Send + Sync {
    async fn handle(&self, path: &Path) -> Result<(), IngestError>;
}
