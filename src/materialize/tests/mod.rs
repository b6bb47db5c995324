use crate::Error;
use crate::error::MaterializeError;
use crate::materialize::*;
use crate::types::MaterializerKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn paths(&self, source: &str) -> MaterializePaths {
        MaterializePaths::new(self.path(source), self.path("temp/job"), self.path("dest"))
    }
}

/// Create a ZIP archive containing the given files (stored, no compression)
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

fn append_tar_entries<W: std::io::Write>(builder: &mut ::tar::Builder<W>, files: &[(&str, &[u8])]) {
    for (name, content) in files {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *content).unwrap();
    }
}

fn create_tar_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut builder = ::tar::Builder::new(file);
    append_tar_entries(&mut builder, files);
    builder.into_inner().unwrap();
}

fn create_tar_gz_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = ::tar::Builder::new(encoder);
    append_tar_entries(&mut builder, files);
    builder.into_inner().unwrap().finish().unwrap();
}

const TEN: &[u8] = &[1u8; 10];
const TWENTY: &[u8] = &[2u8; 20];
const THIRTY: &[u8] = &[3u8; 30];

fn three_entries() -> Vec<(&'static str, &'static [u8])> {
    vec![("a.bin", TEN), ("b.bin", TWENTY), ("sub/c.bin", THIRTY)]
}

fn names_and_sizes(manifest: &[ManifestEntry]) -> Vec<(PathBuf, u64)> {
    manifest.iter().map(|e| (e.name.clone(), e.size)).collect()
}

fn expected_three() -> Vec<(PathBuf, u64)> {
    vec![
        (PathBuf::from("a.bin"), 10),
        (PathBuf::from("b.bin"), 20),
        (PathBuf::from("sub/c.bin"), 30),
    ]
}

// ---------------------------------------------------------------------------
// Archive materializers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zip_three_entries() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &three_entries());

    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    assert!(!job.is_completed().await);
    job.transfer().await.unwrap();

    assert_eq!(names_and_sizes(job.manifest()), expected_three());
    assert_eq!(std::fs::read(fx.path("dest/sub/c.bin")).unwrap(), THIRTY);
    assert!(job.is_completed().await);
    assert_eq!(job.kind(), MaterializerKind::Zip);
}

#[tokio::test]
async fn test_tar_three_entries() {
    let fx = Fixture::new();
    create_tar_archive(&fx.path("pack.tar"), &three_entries());

    let mut job = TarMaterializer::new(fx.paths("pack.tar"));
    job.transfer().await.unwrap();

    assert_eq!(names_and_sizes(job.manifest()), expected_three());
    assert!(job.is_completed().await);
}

#[tokio::test]
async fn test_tar_gz_three_entries() {
    let fx = Fixture::new();
    create_tar_gz_archive(&fx.path("pack.tar.gz"), &three_entries());

    let mut job = materializer_for(
        MaterializerKind::from_path(&fx.path("pack.tar.gz")),
        fx.paths("pack.tar.gz"),
    );
    job.transfer().await.unwrap();

    assert_eq!(job.kind(), MaterializerKind::Tar);
    assert_eq!(names_and_sizes(job.manifest()), expected_three());
    assert_eq!(std::fs::read(fx.path("dest/a.bin")).unwrap(), TEN);
    assert!(job.is_completed().await);
}

#[tokio::test]
async fn test_deleted_file_before_first_check_is_incomplete() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &three_entries());
    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();

    std::fs::remove_file(fx.path("dest/b.bin")).unwrap();

    assert!(!job.is_completed().await);
    // Not latched: restoring the file makes the job complete
    std::fs::write(fx.path("dest/b.bin"), TWENTY).unwrap();
    assert!(job.is_completed().await);
}

#[tokio::test]
async fn test_completion_latches() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &three_entries());
    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();

    assert!(job.is_completed().await);
    std::fs::remove_file(fx.path("dest/a.bin")).unwrap();
    assert!(job.is_completed().await);
}

#[tokio::test]
async fn test_size_mismatch_is_incomplete() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &three_entries());
    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();

    std::fs::write(fx.path("dest/a.bin"), [1u8; 9]).unwrap();
    assert!(!job.is_completed().await);
}

#[tokio::test]
async fn test_stale_temp_contents_are_cleared() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &[("fresh.txt", b"new")]);
    std::fs::create_dir_all(fx.path("temp/job")).unwrap();
    std::fs::write(fx.path("temp/job/stale.txt"), b"left over").unwrap();

    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();

    assert_eq!(
        names_and_sizes(job.manifest()),
        vec![(PathBuf::from("fresh.txt"), 3)]
    );
    assert!(!fx.path("dest/stale.txt").exists());
}

#[tokio::test]
async fn test_zip_entries_escaping_root_are_skipped() {
    let fx = Fixture::new();
    create_zip_archive(
        &fx.path("pack.zip"),
        &[("../evil.txt", b"evil"), ("ok.txt", b"ok")],
    );

    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();

    assert_eq!(
        names_and_sizes(job.manifest()),
        vec![(PathBuf::from("ok.txt"), 2)]
    );
    assert!(!fx.path("temp/evil.txt").exists());
}

#[tokio::test]
async fn test_garbage_archives_fail_to_open() {
    let fx = Fixture::new();
    let garbage = vec![b'x'; 1024];
    for name in ["bad.zip", "bad.rar", "bad.tar", "bad.tgz"] {
        std::fs::write(fx.path(name), &garbage).unwrap();
    }

    let cases = [
        ("bad.zip", "zip_open_failed"),
        ("bad.rar", "rar_open_failed"),
        ("bad.tar", "tar_open_failed"),
        ("bad.tgz", "tar_open_failed"),
    ];
    for (name, code) in cases {
        let mut job = materializer_for(MaterializerKind::from_path(Path::new(name)), fx.paths(name));
        let err = job.transfer().await.unwrap_err();
        assert_eq!(err.error_code(), code, "{name}");
        assert!(job.manifest().is_empty());
        assert!(!job.is_completed().await);
    }
}

#[tokio::test]
async fn test_missing_archive_fails_to_open() {
    let fx = Fixture::new();
    let mut job = ZipMaterializer::new(fx.paths("missing.zip"));

    let err = job.transfer().await.unwrap_err();
    match err {
        Error::Materialize(MaterializeError::ArchiveOpenFailed {
            format, archive, ..
        }) => {
            assert_eq!(format, MaterializerKind::Zip);
            assert_eq!(archive, fx.path("missing.zip"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Copy materializer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_copy_places_file_unchanged() {
    let fx = Fixture::new();
    std::fs::write(fx.path("movie.mkv"), [9u8; 64]).unwrap();

    let mut job = CopyMaterializer::new(fx.paths("movie.mkv"));
    job.transfer().await.unwrap();

    assert_eq!(
        names_and_sizes(job.manifest()),
        vec![(PathBuf::from("movie.mkv"), 64)]
    );
    assert_eq!(std::fs::read(fx.path("dest/movie.mkv")).unwrap(), [9u8; 64]);
    assert!(fx.path("movie.mkv").exists());
    assert!(job.is_completed().await);
}

#[tokio::test]
async fn test_copy_from_explicit_source_appends() {
    let fx = Fixture::new();
    std::fs::write(fx.path("one.txt"), b"1").unwrap();
    std::fs::write(fx.path("two.txt"), b"22").unwrap();

    let mut job = CopyMaterializer::new(fx.paths("one.txt"));
    job.transfer_from(None).await.unwrap();
    job.transfer_from(Some(&fx.path("two.txt"))).await.unwrap();

    assert_eq!(
        names_and_sizes(job.manifest()),
        vec![(PathBuf::from("one.txt"), 1), (PathBuf::from("two.txt"), 2)]
    );
}

#[tokio::test]
async fn test_copy_missing_source_fails() {
    let fx = Fixture::new();
    let mut job = CopyMaterializer::new(fx.paths("missing.bin"));

    let err = job.transfer().await.unwrap_err();
    assert_eq!(err.error_code(), "copy_failed");
    assert!(!job.is_completed().await);
}

// ---------------------------------------------------------------------------
// Cleanup and paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cleanup_removes_temp_dir() {
    let fx = Fixture::new();
    create_zip_archive(&fx.path("pack.zip"), &three_entries());
    let mut job = ZipMaterializer::new(fx.paths("pack.zip"));
    job.transfer().await.unwrap();
    assert!(fx.path("temp/job/sub/c.bin").exists());

    job.cleanup().await.unwrap();

    assert!(!fx.path("temp/job").exists());
    assert!(fx.path("dest/sub/c.bin").exists());
    // Second call finds nothing to remove
    job.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_cleanup_without_transfer() {
    let fx = Fixture::new();
    let mut job = CopyMaterializer::new(fx.paths("never.bin"));
    job.cleanup().await.unwrap();
}

#[test]
fn test_namespaced_temp_dirs() {
    let root = Path::new("/var/tmp/xdcc");
    let a = MaterializePaths::namespaced("/downloads/a.zip", root, "/library");
    let b = MaterializePaths::namespaced("/downloads/b.zip", root, "/library");
    let a_again = MaterializePaths::namespaced("/downloads/a.zip", root, "/library");

    assert_ne!(a.temp_dir, b.temp_dir);
    assert_eq!(a.temp_dir, a_again.temp_dir);
    assert_eq!(a.temp_dir.parent(), Some(root));
    assert_eq!(a.source, PathBuf::from("/downloads/a.zip"));
    assert_eq!(a.destination, PathBuf::from("/library"));
}

#[test]
fn test_materializer_for_kind() {
    let paths = MaterializePaths::new("/d/x", "/t/x", "/dest");
    for kind in [
        MaterializerKind::Copy,
        MaterializerKind::Zip,
        MaterializerKind::Rar,
        MaterializerKind::Tar,
    ] {
        let job = materializer_for(kind, paths.clone());
        assert_eq!(job.kind(), kind);
        assert_eq!(job.paths(), &paths);
    }
}
