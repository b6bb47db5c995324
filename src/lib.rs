//! # xdcc-dl
//!
//! File acquisition engine for XDCC-style peer-to-peer transfers.
//!
//! ## Design Philosophy
//!
//! xdcc-dl is designed to be:
//! - **Resumable** - Progress is checkpointed so an interrupted transfer can pick up where it stopped
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Caller-driven** - The chat layer decides when to open a transfer and which materializer to run
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use xdcc_dl::materialize::{MaterializePaths, materializer_for};
//! use xdcc_dl::transfer::{OpenRequest, TransferEngine};
//! use xdcc_dl::types::MaterializerKind;
//! use xdcc_dl::{Config, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let engine = TransferEngine::new(db, &config)?;
//!
//!     let outcome = engine
//!         .open(OpenRequest::new("203.0.113.7", 5000, "show.rar").expected_size(734_003_200))
//!         .await?;
//!
//!     if outcome.is_completed() {
//!         let source = outcome.destination().to_path_buf();
//!         let paths = MaterializePaths::namespaced(&source, config.temp_dir(), "/library");
//!         let mut job = materializer_for(MaterializerKind::from_path(&source), paths);
//!         job.transfer().await?;
//!         job.cleanup().await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Copying and archive extraction into a destination directory
pub mod materialize;
/// Resumable socket-to-disk transfer sessions
pub mod transfer;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{ByteAccounting, Config};
pub use db::{Database, ProgressRecord, ProgressUpdate};
pub use error::{DatabaseError, Error, MaterializeError, Result, TransferError};
pub use materialize::{Materializer, MaterializePaths, materializer_for};
pub use transfer::{OpenRequest, TransferEngine, TransferOutcome};
pub use types::{MaterializerKind, PeerId, TransferStatus};
