use std::path::Path;

use async_trait::async_trait;

use super::Filesystem;
use crate::errors::{CapabilityError, CapabilityResult};

/// Writes artifacts straight to the local disk.
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn write_file(&self, path: &Path, contents: &str) -> CapabilityResult<()> {
        let io_err = |source| CapabilityError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, contents).await.map_err(io_err)
    }
}
