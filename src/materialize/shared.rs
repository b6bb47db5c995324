use crate::error::{MaterializeError, Result};
use crate::types::MaterializerKind;
use crate::utils::{clear_directory_contents, ensure_writable_dir_chain};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{CopyMaterializer, MaterializeJob};

/// Extract `job`'s source archive and place every extracted file
///
/// `extract_fn` runs on the blocking pool and unpacks the archive into the
/// job's temp dir. The temp dir is emptied first so leftovers from an
/// interrupted job cannot end up in the manifest.
pub(crate) async fn materialize_archive(
    kind: MaterializerKind,
    extract_fn: fn(&Path, &Path) -> Result<()>,
    job: &mut MaterializeJob,
) -> Result<()> {
    let paths = job.paths().clone();

    clear_directory_contents(&paths.temp_dir).await?;
    ensure_writable_dir_chain(&paths.temp_dir).await?;
    ensure_writable_dir_chain(&paths.destination).await?;

    info!(archive = ?paths.source, format = %kind, "extracting archive");

    let source = paths.source.clone();
    let temp_dir = paths.temp_dir.clone();
    let files = spawn_blocking(move || {
        extract_fn(&source, &temp_dir)?;
        extracted_files(&source, &temp_dir)
    })
    .await
    .map_err(|e| MaterializeError::ExtractionFailed {
        archive: paths.source.clone(),
        reason: format!("extraction task panicked: {}", e),
    })??;

    let placer = CopyMaterializer::new(paths.clone());
    for relative in &files {
        let size = placer.place(&paths.temp_dir.join(relative), relative).await?;
        job.manifest_mut().push(relative.clone(), size);
    }
    job.manifest_mut().mark_transferred();

    info!(
        archive = ?paths.source,
        extracted_count = files.len(),
        "{} materialization successful",
        kind
    );
    Ok(())
}

/// Regular files below `temp_dir`, relative to it, in name order
fn extracted_files(archive: &Path, temp_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(temp_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| MaterializeError::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason: format!("failed to walk extracted files: {}", e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(temp_dir) else {
            continue;
        };
        debug!(name = ?relative, "found extracted file");
        files.push(relative.to_path_buf());
    }
    Ok(files)
}

/// Entry path with everything but normal components removed
///
/// Returns `None` when nothing remains (for example a bare `..`).
pub(crate) fn enclosed_path(name: &Path) -> Option<PathBuf> {
    let sanitized: PathBuf = name
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect();
    (!sanitized.as_os_str().is_empty()).then_some(sanitized)
}

/// Map an open failure to the format-specific error
pub(crate) fn open_failed(
    kind: MaterializerKind,
    archive: &Path,
    reason: impl std::fmt::Display,
) -> crate::Error {
    MaterializeError::ArchiveOpenFailed {
        format: kind,
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

/// Map an entry failure to [`MaterializeError::ExtractionFailed`]
pub(crate) fn extraction_failed(archive: &Path, reason: impl std::fmt::Display) -> crate::Error {
    MaterializeError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}
