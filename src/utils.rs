//! Filesystem helpers shared by transfer sessions and materializers
//!
//! Directory preparation, recursive removal and free-space checks live here
//! once so that every materializer and every cleanup path behaves the same.

use crate::error::{Error, Result};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::debug;

/// Ensure every directory from the filesystem root down to `path` exists
///
/// Existing segments must be directories. Before a missing segment is created
/// its parent must be writable. The final directory must be writable too.
///
/// # Errors
///
/// Returns [`Error::DirectoryPrepareFailed`] naming the first segment that is
/// not a directory, cannot be created, or is not writable.
pub async fn ensure_writable_dir_chain(path: &Path) -> Result<()> {
    let mut chain: Vec<&Path> = path
        .ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    chain.reverse();

    for dir in chain {
        match fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => return Err(prepare_failed(dir, "exists but is not a directory")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let parent = parent_or_cwd(dir);
                if !is_writable(parent) {
                    return Err(prepare_failed(parent, "parent directory is not writable"));
                }

                match fs::create_dir(dir).await {
                    Ok(()) => debug!(?dir, "created directory"),
                    // Lost a race with a concurrent creator, which is fine if it made a directory
                    Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {}
                    Err(e) => return Err(prepare_failed(dir, e)),
                }
            }
            Err(e) => return Err(prepare_failed(dir, e)),
        }
    }

    if !is_writable(path) {
        return Err(prepare_failed(path, "directory is not writable"));
    }

    Ok(())
}

/// Remove a file, or a directory and everything below it
///
/// A path that does not exist is treated as already removed. Symlinks are
/// removed themselves, never followed.
pub fn remove_recursively<'a>(
    path: &'a Path,
) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if !meta.is_dir() {
            return match fs::remove_file(path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            };
        }

        clear_directory_contents(path).await?;
        match fs::remove_dir(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    })
}

/// Remove everything inside `path` but keep `path` itself
///
/// A missing directory is left missing.
pub async fn clear_directory_contents(path: &Path) -> std::io::Result<()> {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        remove_recursively(&entry.path()).await?;
    }

    Ok(())
}

/// Reduce a peer-supplied file name to a single safe path component
///
/// Directory parts, `..` and root prefixes are dropped, so the result can be
/// joined onto the download root without escaping it. Returns `None` when
/// nothing usable remains.
///
/// # Examples
///
/// ```
/// use xdcc_dl::utils::sanitize_file_name;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_file_name("movie.mkv"), Some(PathBuf::from("movie.mkv")));
/// assert_eq!(sanitize_file_name("../../etc/passwd"), Some(PathBuf::from("passwd")));
/// assert_eq!(sanitize_file_name(".."), None);
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<PathBuf> {
    Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(PathBuf::from(part)),
            _ => None,
        })
        .next_back()
}

fn parent_or_cwd(dir: &Path) -> &Path {
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn prepare_failed(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::DirectoryPrepareFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Whether the current process may create entries in `dir`
fn is_writable(dir: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
            return false;
        };
        // SAFETY: c_path is a valid, null-terminated C string that outlives the call
        unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
    }

    #[cfg(not(unix))]
    {
        std::fs::metadata(dir)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    }
}

/// Get available disk space for a given path
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
///
/// # Examples
///
/// ```ignore
/// let available = get_available_space(Path::new("/downloads"))?;
/// println!("Available space: {} GB", available / (1024 * 1024 * 1024));
/// ```
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string, stat is zeroed
        // before the call and only read after statvfs reports success
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail counts blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is null-terminated and every out pointer refers
        // to a live, aligned u64
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
