use crate::error::Result;
use crate::types::{MaterializerKind, is_tar_gz};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use super::shared::{extraction_failed, materialize_archive, open_failed};
use super::{MaterializeJob, MaterializePaths, Materializer};

/// Extracts a tarball (`.tar`, `.tar.gz`, `.tgz`) and places its files
#[derive(Debug, Clone)]
pub struct TarMaterializer {
    job: MaterializeJob,
}

impl TarMaterializer {
    /// Create a tar job
    pub fn new(paths: MaterializePaths) -> Self {
        Self {
            job: MaterializeJob::new(paths),
        }
    }

    /// Extract every entry of `archive_path` below `dest_path`
    ///
    /// Gzip is selected by extension. A stream that fails before its first
    /// entry is reported as an open failure.
    fn extract(archive_path: &Path, dest_path: &Path) -> Result<()> {
        debug!(?archive_path, ?dest_path, "attempting tar extraction");

        let file = std::fs::File::open(archive_path)
            .map_err(|e| open_failed(MaterializerKind::Tar, archive_path, e))?;

        if is_tar_gz(archive_path) {
            Self::unpack(tar::Archive::new(GzDecoder::new(file)), archive_path, dest_path)
        } else {
            Self::unpack(tar::Archive::new(file), archive_path, dest_path)
        }
    }

    fn unpack<R: Read>(
        mut archive: tar::Archive<R>,
        archive_path: &Path,
        dest_path: &Path,
    ) -> Result<()> {
        let entries = archive
            .entries()
            .map_err(|e| open_failed(MaterializerKind::Tar, archive_path, e))?;

        let mut seen_entry = false;
        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) if !seen_entry => {
                    return Err(open_failed(MaterializerKind::Tar, archive_path, e));
                }
                Err(e) => return Err(extraction_failed(archive_path, e)),
            };
            seen_entry = true;

            // unpack_in refuses paths that would land outside dest_path
            let unpacked = entry.unpack_in(dest_path).map_err(|e| {
                extraction_failed(archive_path, format!("failed to extract entry: {}", e))
            })?;
            if !unpacked {
                let name = entry.path().map(|p| p.into_owned()).ok();
                warn!(?name, "skipping entry with unsafe path");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Materializer for TarMaterializer {
    fn kind(&self) -> MaterializerKind {
        MaterializerKind::Tar
    }

    fn job(&self) -> &MaterializeJob {
        &self.job
    }

    fn job_mut(&mut self) -> &mut MaterializeJob {
        &mut self.job
    }

    async fn transfer(&mut self) -> Result<()> {
        materialize_archive(MaterializerKind::Tar, Self::extract, &mut self.job).await
    }
}
