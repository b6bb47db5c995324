//! Exclusive per-destination leases
//!
//! Two sessions writing the same destination would interleave their bytes.
//! A session holds a [`PathLease`] for its destination from before the file
//! is touched until it returns.

use crate::error::TransferError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Registry of destination paths currently owned by a session
#[derive(Debug, Clone, Default)]
pub struct PathLeases {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathLeases {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `path`, failing if another session holds it
    pub fn try_acquire(&self, path: &Path) -> Result<PathLease, TransferError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(path.to_path_buf()) {
            return Err(TransferError::DestinationBusy {
                path: path.to_path_buf(),
            });
        }
        debug!(?path, "acquired destination lease");

        Ok(PathLease {
            held: Arc::clone(&self.held),
            path: path.to_path_buf(),
        })
    }

    /// Whether some session currently holds `path`
    pub fn is_held(&self, path: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Ownership of one destination path, released on drop
#[derive(Debug)]
pub struct PathLease {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl PathLease {
    /// The leased path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
        debug!(path = ?self.path, "released destination lease");
    }
}
