//! A single transfer session: prepare, connect, stream, verify.

use super::throttle::CheckpointThrottle;
use crate::config::ByteAccounting;
use crate::db::{Database, ProgressUpdate};
use crate::error::Result;
use crate::types::TransferStatus;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Nominal chunk size the byte counter advances by under [`ByteAccounting::Nominal`]
pub const CHUNK_SIZE: u64 = 2048;

/// Read buffer size, one byte larger than a nominal chunk
///
/// Reads are capped at [`CHUNK_SIZE`]; the spare byte is never filled.
pub(crate) const READ_BUFFER_SIZE: usize = CHUNK_SIZE as usize + 1;

/// How a stream loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamEnd {
    /// Byte counter at the end of the loop
    pub(crate) bytes_counted: u64,
    /// Size to compare the on-disk file against
    pub(crate) expected_size: Option<u64>,
}

pub(crate) struct TransferSession<'a> {
    db: &'a Database,
    destination: PathBuf,
    expected_size: Option<u64>,
    accounting: ByteAccounting,
    throttle: CheckpointThrottle,
    bytes_counted: u64,
    last_checkpoint: Option<u64>,
}

impl<'a> TransferSession<'a> {
    pub(crate) fn new(
        db: &'a Database,
        destination: PathBuf,
        expected_size: Option<u64>,
        accounting: ByteAccounting,
        throttle: CheckpointThrottle,
    ) -> Self {
        Self {
            db,
            destination,
            expected_size,
            accounting,
            throttle,
            bytes_counted: 0,
            last_checkpoint: None,
        }
    }

    /// Bring an existing destination in line with the resume offset
    ///
    /// Without an offset the file is emptied. With one, content before the
    /// offset is kept and anything after it is cut off. An offset past the
    /// end of the file is pulled back to the file length so no holes appear.
    /// Returns the offset the stream will start writing at.
    pub(crate) async fn prepare_destination(&mut self, resume_offset: Option<u64>) -> Result<u64> {
        let existing = match tokio::fs::metadata(&self.destination).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let start = match (existing, resume_offset) {
            (None, Some(offset)) if offset > 0 => {
                tracing::warn!(
                    path = ?self.destination,
                    offset,
                    "resume requested but destination is missing, starting from zero"
                );
                0
            }
            (None, _) => 0,
            (Some(len), None) => {
                if len > 0 {
                    tracing::debug!(path = ?self.destination, len, "truncating existing destination");
                    set_len(&self.destination, 0).await?;
                }
                0
            }
            (Some(len), Some(offset)) => {
                if offset > len {
                    tracing::warn!(
                        path = ?self.destination,
                        offset,
                        len,
                        "resume offset beyond end of file, resuming from file length"
                    );
                    len
                } else {
                    if len > offset {
                        set_len(&self.destination, offset).await?;
                    }
                    offset
                }
            }
        };

        self.bytes_counted = start;
        Ok(start)
    }

    /// Write the initial record: incomplete, at the start offset
    ///
    /// A size stored by an earlier session survives when none is given here.
    /// When resuming, that stored size is the one this session verifies against.
    pub(crate) async fn record_start(&mut self, start: u64) -> Result<()> {
        let record = self
            .db
            .upsert_progress(
                &self.destination,
                ProgressUpdate {
                    status: Some(TransferStatus::Incomplete),
                    expected_size: self.expected_size.map(Some),
                    progress_bytes: Some(Some(start)),
                    ..Default::default()
                },
            )
            .await?;
        if self.expected_size.is_none() && start > 0 {
            self.expected_size = record.expected_size;
        }
        self.last_checkpoint = record.progress_bytes;
        Ok(())
    }

    /// Connect to the peer, bounded by `timeout`
    pub(crate) async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> std::result::Result<TcpStream, String> {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("connect timed out after {:?}", timeout)),
        }
    }

    /// Copy the peer's stream into the destination until EOF or a fault
    ///
    /// Faults end the loop and are only logged; the caller decides the
    /// outcome by comparing the file size afterwards.
    pub(crate) async fn stream(&mut self, mut stream: TcpStream, start: u64) -> StreamEnd {
        if let Err(e) = self.stream_inner(&mut stream, start).await {
            tracing::warn!(path = ?self.destination, error = %e, "transfer interrupted");
        }
        drop(stream);

        StreamEnd {
            bytes_counted: self.bytes_counted,
            expected_size: self.expected_size.or(self.last_checkpoint),
        }
    }

    async fn stream_inner(&mut self, stream: &mut TcpStream, start: u64) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.destination)
            .await?;
        file.seek(SeekFrom::Start(start)).await?;

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let result = async {
            loop {
                let n = stream.read(&mut buf[..CHUNK_SIZE as usize]).await?;
                if n == 0 {
                    return Ok::<(), std::io::Error>(());
                }
                file.write_all(&buf[..n]).await?;

                self.bytes_counted += match self.accounting {
                    ByteAccounting::Nominal => CHUNK_SIZE,
                    ByteAccounting::Actual => n as u64,
                };

                if self.throttle.should_update() {
                    self.checkpoint().await;
                }
            }
        }
        .await;

        // Buffered writes must land before the caller stats the file
        file.flush().await?;
        result
    }

    async fn checkpoint(&mut self) {
        let update = ProgressUpdate {
            progress_bytes: Some(Some(self.bytes_counted)),
            ..Default::default()
        };
        match self.db.upsert_progress(&self.destination, update).await {
            Ok(record) => {
                tracing::trace!(path = ?self.destination, bytes = self.bytes_counted, "checkpoint");
                self.last_checkpoint = record.progress_bytes;
            }
            Err(e) => {
                tracing::warn!(path = ?self.destination, error = %e, "failed to write checkpoint");
            }
        }
    }

    /// Mark the record completed
    pub(crate) async fn record_completed(&self, size: u64) {
        let update = ProgressUpdate {
            status: Some(TransferStatus::Completed),
            expected_size: Some(Some(size)),
            progress_bytes: Some(None),
            ..Default::default()
        };
        if let Err(e) = self.db.upsert_progress(&self.destination, update).await {
            tracing::warn!(path = ?self.destination, error = %e, "failed to mark transfer completed");
        }
    }

    pub(crate) fn destination(&self) -> &Path {
        &self.destination
    }
}

async fn set_len(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await
}
