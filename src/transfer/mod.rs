//! Transfer sessions: one socket-to-disk download per [`TransferEngine::open`] call
//!
//! A session looks up the transfer request the chat layer recorded, prepares
//! the destination file, streams the peer's bytes into it while checkpointing
//! progress, and finally decides whether the file is complete.
//!
//! ## Submodules
//!
//! - [`throttle`] - Checkpoint rate limiting over an injectable clock
//! - [`lease`] - Exclusive per-destination leases
//! - [`resume`] - Resume actions for prematurely terminated transfers

mod session;

pub mod lease;
pub mod resume;
pub mod throttle;


pub use lease::{PathLease, PathLeases};
pub use resume::{CommandResumeTrigger, NoOpResumeTrigger, ResumeContext, ResumeTrigger};
pub use session::CHUNK_SIZE;
pub use throttle::{CheckpointThrottle, Clock, SystemClock};

use crate::config::{Config, TransferConfig};
use crate::db::Database;
use crate::error::{Result, TransferError};
use crate::types::PeerId;
use crate::utils::{ensure_writable_dir_chain, get_available_space, sanitize_file_name};
use session::TransferSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Parameters of one incoming transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Peer host to connect to
    pub host: String,
    /// Peer port to connect to
    pub port: u16,
    /// File name as offered by the peer
    pub file_name: String,
    /// Size the peer announced, if any
    pub expected_size: Option<u64>,
    /// Peer the file was requested from, if known
    pub peer_id: Option<PeerId>,
    /// Offset to resume writing at
    pub resume_offset: Option<u64>,
}

impl OpenRequest {
    /// Create a request for a fresh download
    pub fn new(host: impl Into<String>, port: u16, file_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            file_name: file_name.into(),
            expected_size: None,
            peer_id: None,
            resume_offset: None,
        }
    }

    /// Set the announced file size
    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Restrict the descriptor lookup to one peer
    pub fn peer(mut self, peer_id: PeerId) -> Self {
        self.peer_id = Some(peer_id);
        self
    }

    /// Resume at `offset` instead of starting over
    pub fn resume_from(mut self, offset: u64) -> Self {
        self.resume_offset = Some(offset);
        self
    }
}

/// Result of an [`open`](TransferEngine::open) call that got past its preconditions
#[derive(Debug)]
pub enum TransferOutcome {
    /// The peer accepted the connection and the stream ran to its end
    Connected(TransferSummary),
    /// The peer could not be reached; the record stays incomplete
    ConnectionFailed {
        /// Destination the bytes would have gone to
        destination: PathBuf,
        /// Why connecting failed
        reason: String,
    },
}

impl TransferOutcome {
    /// Destination file path
    pub fn destination(&self) -> &Path {
        match self {
            TransferOutcome::Connected(summary) => &summary.destination,
            TransferOutcome::ConnectionFailed { destination, .. } => destination,
        }
    }

    /// Whether the destination was verified complete
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Connected(TransferSummary {
                completion: Completion::Completed,
                ..
            })
        )
    }
}

/// What a connected session did
#[derive(Debug)]
pub struct TransferSummary {
    /// Destination file path
    pub destination: PathBuf,
    /// Offset the stream started writing at
    pub start_offset: u64,
    /// Byte counter at the end of the stream
    pub bytes_counted: u64,
    /// Size the file was compared against, if one was known
    pub expected_size: Option<u64>,
    /// On-disk length after the stream ended
    pub file_size: u64,
    /// Verdict of the size comparison
    pub completion: Completion,
}

/// Verdict of the final size comparison
#[derive(Debug)]
pub enum Completion {
    /// On-disk size equals the expected size
    Completed,
    /// The stream ended short (or long) of the expected size
    Premature {
        /// Handle of the spawned resume action, when a resume context resolved
        resume: Option<JoinHandle<()>>,
    },
}

/// Runs transfer sessions against a shared progress store
///
/// Cloning is cheap; clones share the store, the resume trigger and the
/// destination leases.
#[derive(Clone)]
pub struct TransferEngine {
    db: Arc<Database>,
    config: Arc<TransferConfig>,
    resume: Arc<dyn ResumeTrigger>,
    leases: PathLeases,
    clock: Arc<dyn Clock>,
}

impl TransferEngine {
    /// Create an engine from configuration
    ///
    /// Uses [`CommandResumeTrigger`] when a resume command is configured and
    /// [`NoOpResumeTrigger`] otherwise.
    pub fn new(db: Arc<Database>, config: &Config) -> Result<Self> {
        config.validate()?;

        let resume: Arc<dyn ResumeTrigger> = match CommandResumeTrigger::from_config(&config.resume)? {
            Some(trigger) => {
                tracing::info!(program = ?trigger.program(), "resume command configured");
                Arc::new(trigger)
            }
            None => Arc::new(NoOpResumeTrigger),
        };

        Ok(Self {
            db,
            config: Arc::new(config.transfer.clone()),
            resume,
            leases: PathLeases::new(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the resume trigger
    pub fn with_resume_trigger(mut self, trigger: Arc<dyn ResumeTrigger>) -> Self {
        self.resume = trigger;
        self
    }

    /// Replace the clock sessions use for checkpoint throttling
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Destination leases held by running sessions
    pub fn leases(&self) -> &PathLeases {
        &self.leases
    }

    /// Progress store
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Where a file with this name is written
    pub fn destination_for(&self, file_name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| TransferError::InvalidFileName {
            name: file_name.to_string(),
        })?;
        Ok(self.config.download_dir.join(name))
    }

    /// On-disk length of a partially downloaded file, if one exists
    ///
    /// This is the offset a resume action passes back to [`open`](Self::open).
    pub async fn resume_offset(&self, file_name: &str) -> Result<Option<u64>> {
        let destination = self.destination_for(file_name)?;
        match tokio::fs::metadata(&destination).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Download one file from a peer
    ///
    /// # Errors
    ///
    /// Fails before any bytes move when no transfer request matches, the
    /// file name is unusable, the download directory cannot be prepared, the
    /// destination is already being written, or the initial progress record
    /// cannot be written. Faults after that are logged and reflected in the
    /// returned outcome and the progress record.
    pub async fn open(&self, request: OpenRequest) -> Result<TransferOutcome> {
        let descriptor = self
            .db
            .find_transfer_request(&request.file_name, request.peer_id)
            .await?
            .ok_or_else(|| TransferError::UnknownTransferDescriptor {
                file_name: request.file_name.clone(),
                peer_id: request.peer_id,
            })?;

        let destination = self.destination_for(&request.file_name)?;
        ensure_writable_dir_chain(&self.config.download_dir).await?;
        let _lease = self.leases.try_acquire(&destination)?;

        let mut session = TransferSession::new(
            &self.db,
            destination.clone(),
            request.expected_size,
            self.config.byte_accounting,
            CheckpointThrottle::new(Arc::clone(&self.clock), self.config.checkpoint_interval),
        );

        let start = session.prepare_destination(request.resume_offset).await?;
        session.record_start(start).await?;

        tracing::info!(
            file = %request.file_name,
            destination = ?destination,
            host = %request.host,
            port = request.port,
            start,
            "starting transfer"
        );
        self.warn_if_low_on_space(request.expected_size, start);

        let stream = match TransferSession::connect(
            &request.host,
            request.port,
            self.config.connect_timeout,
        )
        .await
        {
            Ok(stream) => stream,
            Err(reason) => {
                tracing::warn!(
                    host = %request.host,
                    port = request.port,
                    reason = %reason,
                    "failed to connect to peer"
                );
                return Ok(TransferOutcome::ConnectionFailed {
                    destination,
                    reason,
                });
            }
        };

        let end = session.stream(stream, start).await;

        let file_size = match tokio::fs::metadata(session.destination()).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(destination = ?destination, error = %e, "failed to stat destination");
                0
            }
        };

        let completion = if end.expected_size == Some(file_size) {
            session.record_completed(file_size).await;
            tracing::info!(destination = ?destination, size = file_size, "transfer completed");
            Completion::Completed
        } else {
            tracing::warn!(
                destination = ?destination,
                size = file_size,
                expected = ?end.expected_size,
                "transfer terminated prematurely"
            );
            let resume = match ResumeContext::from_request(&descriptor, &destination, file_size) {
                Some(context) => Some(self.spawn_resume(context).await),
                None => {
                    tracing::info!(destination = ?destination, "no peer context to resume from");
                    None
                }
            };
            Completion::Premature { resume }
        };

        Ok(TransferOutcome::Connected(TransferSummary {
            destination,
            start_offset: start,
            bytes_counted: end.bytes_counted,
            expected_size: end.expected_size,
            file_size,
            completion,
        }))
    }

    async fn spawn_resume(&self, context: ResumeContext) -> JoinHandle<()> {
        if let Err(e) = self.db.mark_resume_pending(&context.destination).await {
            tracing::warn!(destination = ?context.destination, error = %e, "failed to mark resume pending");
        }

        let db = Arc::clone(&self.db);
        let trigger = Arc::clone(&self.resume);
        tracing::info!(
            destination = ?context.destination,
            offset = context.resume_offset,
            trigger = trigger.name(),
            "requesting resume"
        );

        tokio::spawn(async move {
            if let Err(e) = trigger.request_resume(&context).await {
                tracing::warn!(destination = ?context.destination, error = %e, "resume action failed");
            }
            if let Err(e) = db.clear_resume_status(&context.destination).await {
                tracing::warn!(destination = ?context.destination, error = %e, "failed to clear resume status");
            }
        })
    }

    fn warn_if_low_on_space(&self, expected_size: Option<u64>, start: u64) {
        let Some(expected) = expected_size else {
            return;
        };
        let remaining = expected.saturating_sub(start);
        match get_available_space(&self.config.download_dir) {
            Ok(available) if available < remaining => {
                tracing::warn!(
                    available,
                    remaining,
                    dir = ?self.config.download_dir,
                    "download directory may not have enough free space"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "could not check free space"),
        }
    }
}
