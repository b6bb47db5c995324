//! Materializers: move a downloaded file into its final destination
//!
//! A plain file is copied unchanged. An archive is extracted into a private
//! temp directory first, then every extracted file is copied into the
//! destination. Each job keeps a manifest of what it placed so callers can
//! poll [`Materializer::is_completed`] and finally [`Materializer::cleanup`].
//!
//! The caller picks the strategy, usually with
//! [`MaterializerKind::from_path`]; file contents are never sniffed.

mod copy;
mod rar;
mod shared;
mod tar;
mod zip;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use copy::CopyMaterializer;
pub use rar::RarMaterializer;
pub use tar::TarMaterializer;
pub use zip::ZipMaterializer;

use crate::error::Result;
use crate::types::MaterializerKind;
use crate::utils::remove_recursively;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Paths a materialization job works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializePaths {
    /// Downloaded file (plain file or archive)
    pub source: PathBuf,
    /// Private scratch directory, removed by cleanup
    pub temp_dir: PathBuf,
    /// Directory the results are placed in
    pub destination: PathBuf,
}

impl MaterializePaths {
    /// Create paths with an explicit temp directory
    pub fn new(
        source: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            temp_dir: temp_dir.into(),
            destination: destination.into(),
        }
    }

    /// Create paths with a temp directory derived from the source path
    ///
    /// Jobs for different sources get different directories under
    /// `temp_root`, so concurrent jobs never share scratch space.
    pub fn namespaced(
        source: impl Into<PathBuf>,
        temp_root: &Path,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let source = source.into();
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        let hex = format!("{:x}", digest);
        let temp_dir = temp_root.join(format!("job-{}", &hex[..16]));
        Self::new(source, temp_dir, destination)
    }
}

/// One file a job placed in its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the destination directory
    pub name: PathBuf,
    /// Size in bytes at the time it was placed
    pub size: u64,
}

/// Files a job has placed, plus its completion latch
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    transferred: bool,
    completed: bool,
}

impl Manifest {
    /// Entries in the order they were placed
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub(crate) fn push(&mut self, name: PathBuf, size: u64) {
        self.entries.push(ManifestEntry { name, size });
    }

    pub(crate) fn mark_transferred(&mut self) {
        self.transferred = true;
    }

    /// Whether every entry is present in `destination` at its recorded size
    ///
    /// Returns false until a transfer has succeeded. Once this returns true
    /// it keeps returning true without touching the filesystem again.
    pub async fn is_completed(&mut self, destination: &Path) -> bool {
        if self.completed {
            return true;
        }
        if !self.transferred {
            return false;
        }

        for entry in &self.entries {
            let path = destination.join(&entry.name);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() == entry.size => {}
                Ok(meta) => {
                    debug!(?path, expected = entry.size, actual = meta.len(), "size mismatch");
                    return false;
                }
                Err(_) => {
                    debug!(?path, "manifest entry missing");
                    return false;
                }
            }
        }

        self.completed = true;
        true
    }
}

/// State shared by every materializer: its paths and its manifest
#[derive(Debug, Clone)]
pub struct MaterializeJob {
    paths: MaterializePaths,
    manifest: Manifest,
}

impl MaterializeJob {
    /// Start a job with an empty manifest
    pub fn new(paths: MaterializePaths) -> Self {
        Self {
            paths,
            manifest: Manifest::default(),
        }
    }

    /// Paths this job works with
    pub fn paths(&self) -> &MaterializePaths {
        &self.paths
    }

    /// Files placed so far
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub(crate) fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Whether every manifest entry is present in the destination
    pub async fn is_completed(&mut self) -> bool {
        self.manifest.is_completed(&self.paths.destination).await
    }

    /// Remove manifest-named files from the temp dir, then the temp dir
    pub async fn cleanup(&self) -> Result<()> {
        for entry in self.manifest.entries() {
            let path = self.paths.temp_dir.join(&entry.name);
            if let Err(e) = remove_recursively(&path).await {
                warn!(?path, error = %e, "failed to remove temp file");
            }
        }
        remove_recursively(&self.paths.temp_dir).await?;
        debug!(temp_dir = ?self.paths.temp_dir, "cleaned up temp directory");
        Ok(())
    }
}

/// Common interface of the materializer family
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Strategy this materializer implements
    fn kind(&self) -> MaterializerKind;

    /// Job state
    fn job(&self) -> &MaterializeJob;

    /// Mutable job state
    fn job_mut(&mut self) -> &mut MaterializeJob;

    /// Place the source's content into the destination
    async fn transfer(&mut self) -> Result<()>;

    /// Paths this job works with
    fn paths(&self) -> &MaterializePaths {
        self.job().paths()
    }

    /// Files placed so far
    fn manifest(&self) -> &[ManifestEntry] {
        self.job().manifest().entries()
    }

    /// Whether every placed file is still present at its recorded size
    ///
    /// False before a successful [`transfer`](Self::transfer); latches once true.
    async fn is_completed(&mut self) -> bool {
        self.job_mut().is_completed().await
    }

    /// Remove the job's temp directory
    ///
    /// Missing paths are ignored, so calling this twice is harmless.
    async fn cleanup(&mut self) -> Result<()> {
        self.job().cleanup().await
    }
}

/// Build the materializer for `kind`
pub fn materializer_for(kind: MaterializerKind, paths: MaterializePaths) -> Box<dyn Materializer> {
    match kind {
        MaterializerKind::Copy => Box::new(CopyMaterializer::new(paths)),
        MaterializerKind::Zip => Box::new(ZipMaterializer::new(paths)),
        MaterializerKind::Rar => Box::new(RarMaterializer::new(paths)),
        MaterializerKind::Tar => Box::new(TarMaterializer::new(paths)),
    }
}
