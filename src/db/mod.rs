//! Database layer for xdcc-dl
//!
//! Handles SQLite persistence for the two tables the engine touches.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`progress`] - Progress records keyed by destination path
//! - [`requests`] - Transfer requests written by the chat layer

use crate::types::{PeerId, TransferStatus};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod migrations;
mod progress;
mod requests;

/// New transfer request to be inserted into the database
///
/// The chat layer records one of these every time it asks a peer for a file.
#[derive(Debug, Clone, Default)]
pub struct NewTransferRequest {
    /// File name the peer will send
    pub file_name: String,
    /// Peer the file was requested from
    pub peer_id: Option<PeerId>,
    /// Network the peer lives on
    pub network: Option<String>,
    /// Nickname of the bot serving the file
    pub bot: Option<String>,
    /// Pack identifier on the bot
    pub pack: Option<String>,
}

/// Transfer request record from database
#[derive(Debug, Clone, FromRow)]
pub struct TransferRequest {
    /// Unique database ID
    pub id: i64,
    /// File name the peer will send
    pub file_name: String,
    /// Peer the file was requested from
    pub peer_id: Option<PeerId>,
    /// Network the peer lives on
    pub network: Option<String>,
    /// Nickname of the bot serving the file
    pub bot: Option<String>,
    /// Pack identifier on the bot
    pub pack: Option<String>,
    /// Unix timestamp when the request was made
    pub created_at: i64,
}

/// Progress record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ProgressRow {
    /// Destination file path (primary key)
    pub destination_path: String,
    /// Status code (see [`TransferStatus::to_i32`])
    pub status: i32,
    /// Expected file size in bytes
    pub expected_size: Option<i64>,
    /// Bytes written as of the last checkpoint
    pub progress_bytes: Option<i64>,
    /// Number of resume actions requested so far
    pub resume_total: Option<i64>,
    /// Resume action state (non-null while one is running)
    pub resume_status: Option<i64>,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

/// Download progress for one destination file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    /// Destination file path
    pub destination_path: PathBuf,
    /// Current status
    pub status: TransferStatus,
    /// Expected file size in bytes
    pub expected_size: Option<u64>,
    /// Bytes written as of the last checkpoint, cleared on completion
    pub progress_bytes: Option<u64>,
    /// Number of resume actions requested so far
    pub resume_total: Option<u32>,
    /// Resume action state (non-null while one is running)
    pub resume_status: Option<u32>,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

impl From<ProgressRow> for ProgressRecord {
    fn from(row: ProgressRow) -> Self {
        ProgressRecord {
            destination_path: PathBuf::from(row.destination_path),
            status: TransferStatus::from_i32(row.status),
            expected_size: row.expected_size.map(|v| v.max(0) as u64),
            progress_bytes: row.progress_bytes.map(|v| v.max(0) as u64),
            resume_total: row.resume_total.map(|v| v.clamp(0, u32::MAX as i64) as u32),
            resume_status: row.resume_status.map(|v| v.clamp(0, u32::MAX as i64) as u32),
            updated_at: row.updated_at,
        }
    }
}

/// Partial update of a progress record
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears
/// the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    /// New status
    pub status: Option<TransferStatus>,
    /// New expected size
    pub expected_size: Option<Option<u64>>,
    /// New progress counter
    pub progress_bytes: Option<Option<u64>>,
    /// New resume count
    pub resume_total: Option<Option<u32>>,
    /// New resume state
    pub resume_status: Option<Option<u32>>,
}

impl ProgressUpdate {
    /// Apply this update on top of the current field values
    ///
    /// New records start out queued. A progress counter above a known
    /// expected size is clamped to it.
    pub(crate) fn merge_into(self, current: Option<ProgressRecord>, path: PathBuf) -> ProgressRecord {
        let mut record = current.unwrap_or(ProgressRecord {
            destination_path: path,
            status: TransferStatus::Queued,
            expected_size: None,
            progress_bytes: None,
            resume_total: None,
            resume_status: None,
            updated_at: 0,
        });

        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(expected_size) = self.expected_size {
            record.expected_size = expected_size;
        }
        if let Some(progress_bytes) = self.progress_bytes {
            record.progress_bytes = progress_bytes;
        }
        if let Some(resume_total) = self.resume_total {
            record.resume_total = resume_total;
        }
        if let Some(resume_status) = self.resume_status {
            record.resume_status = resume_status;
        }

        if let (Some(progress), Some(expected)) = (record.progress_bytes, record.expected_size)
            && progress > expected
        {
            record.progress_bytes = Some(expected);
        }

        record.updated_at = chrono::Utc::now().timestamp();
        record
    }
}

/// Database handle for xdcc-dl
pub struct Database {
    pool: SqlitePool,
}
