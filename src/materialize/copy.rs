use crate::error::{MaterializeError, Result};
use crate::types::MaterializerKind;
use crate::utils::ensure_writable_dir_chain;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{MaterializeJob, MaterializePaths, Materializer};

/// Copies a plain file into the destination directory unchanged
///
/// Archive materializers also use one of these to place each extracted file.
#[derive(Debug, Clone)]
pub struct CopyMaterializer {
    job: MaterializeJob,
}

impl CopyMaterializer {
    /// Create a copy job
    pub fn new(paths: MaterializePaths) -> Self {
        Self {
            job: MaterializeJob::new(paths),
        }
    }

    /// Copy `source` (the job's source when `None`) into the destination
    ///
    /// The file keeps its base name and is appended to the manifest.
    pub async fn transfer_from(&mut self, source: Option<&Path>) -> Result<()> {
        let source = source.unwrap_or(self.job.paths().source.as_path()).to_path_buf();
        let name = source
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| MaterializeError::CopyFailed {
                source_path: source.clone(),
                dest_path: self.job.paths().destination.clone(),
                reason: "source has no file name".to_string(),
            })?;

        let size = self.place(&source, &name).await?;
        let manifest = self.job.manifest_mut();
        manifest.push(name, size);
        manifest.mark_transferred();

        info!(?source, size, "copied file into destination");
        Ok(())
    }

    /// Copy `source` to `destination/<relative>`, returning the bytes copied
    pub(crate) async fn place(&self, source: &Path, relative: &Path) -> Result<u64> {
        let dest_path = self.job.paths().destination.join(relative);
        if let Some(parent) = dest_path.parent() {
            ensure_writable_dir_chain(parent).await?;
        }

        let size = tokio::fs::copy(source, &dest_path)
            .await
            .map_err(|e| MaterializeError::CopyFailed {
                source_path: source.to_path_buf(),
                dest_path: dest_path.clone(),
                reason: e.to_string(),
            })?;

        debug!(?source, ?dest_path, size, "placed file");
        Ok(size)
    }
}

#[async_trait]
impl Materializer for CopyMaterializer {
    fn kind(&self) -> MaterializerKind {
        MaterializerKind::Copy
    }

    fn job(&self) -> &MaterializeJob {
        &self.job
    }

    fn job_mut(&mut self) -> &mut MaterializeJob {
        &mut self.job
    }

    async fn transfer(&mut self) -> Result<()> {
        self.transfer_from(None).await
    }
}
