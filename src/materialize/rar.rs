use crate::error::Result;
use crate::types::MaterializerKind;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use super::shared::{enclosed_path, extraction_failed, materialize_archive, open_failed};
use super::{MaterializeJob, MaterializePaths, Materializer};

/// Extracts a RAR archive (`.rar`, or `.r00` for the first volume) and places its files
#[derive(Debug, Clone)]
pub struct RarMaterializer {
    job: MaterializeJob,
}

impl RarMaterializer {
    /// Create a RAR job
    pub fn new(paths: MaterializePaths) -> Self {
        Self {
            job: MaterializeJob::new(paths),
        }
    }

    /// Extract every entry of `archive_path` below `dest_path`
    fn extract(archive_path: &Path, dest_path: &Path) -> Result<()> {
        debug!(?archive_path, ?dest_path, "attempting RAR extraction");

        let mut at_header = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| open_failed(MaterializerKind::Rar, archive_path, e))?;

        // State machine: read_header moves to the entry, extract/skip moves back
        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(extraction_failed(archive_path, e)),
            };

            let header = at_file.entry();
            let Some(relative) = enclosed_path(&header.filename) else {
                warn!(name = ?header.filename, "skipping entry with unsafe path");
                at_header = at_file.skip().map_err(|e| {
                    extraction_failed(archive_path, format!("failed to skip unsafe entry: {}", e))
                })?;
                continue;
            };

            if header.is_directory() {
                at_header = at_file.skip().map_err(|e| {
                    extraction_failed(archive_path, format!("failed to skip directory: {}", e))
                })?;
                continue;
            }

            let out_path = dest_path.join(relative);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| extraction_failed(archive_path, e))?;
            }
            at_header = at_file
                .extract_to(&out_path)
                .map_err(|e| extraction_failed(archive_path, e))?;
        }

        Ok(())
    }
}

#[async_trait]
impl Materializer for RarMaterializer {
    fn kind(&self) -> MaterializerKind {
        MaterializerKind::Rar
    }

    fn job(&self) -> &MaterializeJob {
        &self.job
    }

    fn job_mut(&mut self) -> &mut MaterializeJob {
        &mut self.job
    }

    async fn transfer(&mut self) -> Result<()> {
        materialize_archive(MaterializerKind::Rar, Self::extract, &mut self.job).await
    }
}
