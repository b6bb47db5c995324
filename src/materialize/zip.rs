use crate::error::Result;
use crate::types::MaterializerKind;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use super::shared::{extraction_failed, materialize_archive, open_failed};
use super::{MaterializeJob, MaterializePaths, Materializer};

/// Extracts a ZIP archive and places its files
#[derive(Debug, Clone)]
pub struct ZipMaterializer {
    job: MaterializeJob,
}

impl ZipMaterializer {
    /// Create a ZIP job
    pub fn new(paths: MaterializePaths) -> Self {
        Self {
            job: MaterializeJob::new(paths),
        }
    }

    /// Extract every entry of `archive_path` below `dest_path`
    fn extract(archive_path: &Path, dest_path: &Path) -> Result<()> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let file = std::fs::File::open(archive_path)
            .map_err(|e| open_failed(MaterializerKind::Zip, archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| open_failed(MaterializerKind::Zip, archive_path, e))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| extraction_failed(archive_path, format!("failed to read ZIP entry: {}", e)))?;

            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(name = entry.name(), "skipping entry with unsafe path");
                continue;
            };
            let out_path = dest_path.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out_path).map_err(|e| extraction_failed(archive_path, e))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| extraction_failed(archive_path, e))?;
            }
            let mut outfile =
                std::fs::File::create(&out_path).map_err(|e| extraction_failed(archive_path, e))?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                extraction_failed(archive_path, format!("failed to extract file: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl Materializer for ZipMaterializer {
    fn kind(&self) -> MaterializerKind {
        MaterializerKind::Zip
    }

    fn job(&self) -> &MaterializeJob {
        &self.job
    }

    fn job_mut(&mut self) -> &mut MaterializeJob {
        &mut self.job
    }

    async fn transfer(&mut self) -> Result<()> {
        materialize_archive(MaterializerKind::Zip, Self::extract, &mut self.job).await
    }
}
