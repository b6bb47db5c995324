//! Error types for xdcc-dl
//!
//! This module provides the error taxonomy for the engine:
//! - Domain-specific error types (Transfer, Materialize, Database)
//! - Machine-readable error codes for dashboards polling job state
//! - Context information (file name, peer, archive path, etc.)
//!
//! Errors discovered before any bytes move (descriptor lookup, directory
//! preparation, archive open) are returned as typed failures. Faults during a
//! byte transfer are absorbed into the progress record instead.

use crate::types::{MaterializerKind, PeerId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for xdcc-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xdcc-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Transfer session error
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Materialization error (copy or archive extraction)
    #[error("materialize error: {0}")]
    Materialize(#[from] MaterializeError),

    /// A required directory chain could not be created or is not writable
    #[error("failed to prepare directory {path}: {reason}")]
    DirectoryPrepareFailed {
        /// The directory that could not be prepared
        path: PathBuf,
        /// Why preparation failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External tool execution failed (resume command)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised by a transfer session before any bytes are streamed
#[derive(Debug, Error)]
pub enum TransferError {
    /// No transfer request matches the file name and peer
    #[error("no transfer request found for {file_name} (peer {peer_id:?})")]
    UnknownTransferDescriptor {
        /// File name offered by the peer
        file_name: String,
        /// Peer the file was requested from, if known
        peer_id: Option<PeerId>,
    },

    /// File name has no usable path component
    #[error("invalid file name {name:?}")]
    InvalidFileName {
        /// The name as offered by the peer
        name: String,
    },

    /// Another session currently owns this destination path
    #[error("destination {path} is already being written by another session")]
    DestinationBusy {
        /// The contested destination path
        path: PathBuf,
    },
}

/// Materialization errors (copy step and archive handling)
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The archive could not be opened as the requested format
    #[error("failed to open {format} archive {archive}: {reason}")]
    ArchiveOpenFailed {
        /// Archive format the caller selected
        format: MaterializerKind,
        /// The archive file
        archive: PathBuf,
        /// The reason opening failed
        reason: String,
    },

    /// The archive opened but an entry could not be extracted
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Copying a file into the destination directory failed
    #[error("failed to copy {source_path} to {dest_path}: {reason}")]
    CopyFailed {
        /// The file being copied
        source_path: PathBuf,
        /// Where it should have landed
        dest_path: PathBuf,
        /// The reason the copy failed
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Transfer(e) => match e {
                TransferError::UnknownTransferDescriptor { .. } => "unknown_transfer_descriptor",
                TransferError::InvalidFileName { .. } => "invalid_file_name",
                TransferError::DestinationBusy { .. } => "destination_busy",
            },
            Error::Materialize(e) => match e {
                MaterializeError::ArchiveOpenFailed { format, .. } => match format {
                    MaterializerKind::Zip => "zip_open_failed",
                    MaterializerKind::Rar => "rar_open_failed",
                    MaterializerKind::Tar => "tar_open_failed",
                    MaterializerKind::Copy => "archive_open_failed",
                },
                MaterializeError::ExtractionFailed { .. } => "extraction_failed",
                MaterializeError::CopyFailed { .. } => "copy_failed",
            },
            Error::DirectoryPrepareFailed { .. } => "directory_prepare_failed",
            Error::Io(_) => "io_error",
            Error::ExternalTool(_) => "external_tool_error",
        }
    }

    /// Whether this error was raised before any transfer I/O began
    ///
    /// Such errors are the caller's to handle; anything else surfaced from a
    /// session is a store failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::Transfer(_) | Error::DirectoryPrepareFailed { .. } | Error::Config { .. }
        )
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("download_dir".into()),
                },
                "config_error",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("timeout".into())),
                "database_error",
            ),
            (
                Error::Transfer(TransferError::UnknownTransferDescriptor {
                    file_name: "movie.mkv".into(),
                    peer_id: Some(PeerId(42)),
                }),
                "unknown_transfer_descriptor",
            ),
            (
                Error::Transfer(TransferError::InvalidFileName { name: "..".into() }),
                "invalid_file_name",
            ),
            (
                Error::Transfer(TransferError::DestinationBusy {
                    path: PathBuf::from("/dl/movie.mkv"),
                }),
                "destination_busy",
            ),
            (
                Error::Materialize(MaterializeError::ArchiveOpenFailed {
                    format: MaterializerKind::Zip,
                    archive: PathBuf::from("a.zip"),
                    reason: "bad".into(),
                }),
                "zip_open_failed",
            ),
            (
                Error::Materialize(MaterializeError::ArchiveOpenFailed {
                    format: MaterializerKind::Rar,
                    archive: PathBuf::from("a.rar"),
                    reason: "bad".into(),
                }),
                "rar_open_failed",
            ),
            (
                Error::Materialize(MaterializeError::ArchiveOpenFailed {
                    format: MaterializerKind::Tar,
                    archive: PathBuf::from("a.tar"),
                    reason: "bad".into(),
                }),
                "tar_open_failed",
            ),
            (
                Error::Materialize(MaterializeError::CopyFailed {
                    source_path: PathBuf::from("/tmp/a"),
                    dest_path: PathBuf::from("/dst/a"),
                    reason: "disk full".into(),
                }),
                "copy_failed",
            ),
            (
                Error::DirectoryPrepareFailed {
                    path: PathBuf::from("/readonly/dl"),
                    reason: "not writable".into(),
                },
                "directory_prepare_failed",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (Error::ExternalTool("exit 1".into()), "external_tool_error"),
        ]
    }

    #[test]
    fn error_codes_are_stable() {
        for (error, code) in all_error_variants() {
            assert_eq!(error.error_code(), code, "wrong code for {error}");
        }
    }

    #[test]
    fn preconditions_are_distinguished_from_store_failures() {
        let unknown = Error::Transfer(TransferError::UnknownTransferDescriptor {
            file_name: "x".into(),
            peer_id: None,
        });
        assert!(unknown.is_precondition());

        let store = Error::Database(DatabaseError::QueryFailed("locked".into()));
        assert!(!store.is_precondition());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::Materialize(MaterializeError::ArchiveOpenFailed {
            format: MaterializerKind::Tar,
            archive: PathBuf::from("/tmp/pack.tar"),
            reason: "checksum mismatch".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("tar"));
        assert!(msg.contains("/tmp/pack.tar"));
        assert!(msg.contains("checksum mismatch"));
    }
}
