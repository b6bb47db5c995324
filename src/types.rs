//! Core types for xdcc-dl

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifier of the peer (bot) a file was requested from
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub i64);

impl PeerId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for PeerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for PeerId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for PeerId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for PeerId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Status of a progress record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Waiting for the peer to start sending
    Queued,
    /// Started but not verified complete (possibly stalled)
    Incomplete,
    /// Every expected byte is on disk
    Completed,
}

impl TransferStatus {
    /// Convert integer status code to TransferStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TransferStatus::Queued,
            2 => TransferStatus::Completed,
            _ => TransferStatus::Incomplete, // Unknown codes are treated as not done
        }
    }

    /// Convert TransferStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TransferStatus::Queued => 0,
            TransferStatus::Incomplete => 1,
            TransferStatus::Completed => 2,
        }
    }
}

/// `resume_status` value while an external resume action is running
pub const RESUME_PENDING: u32 = 1;

/// Materialization strategy, picked by the caller from the file name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializerKind {
    /// Plain file, copied unchanged
    Copy,
    /// ZIP archive (.zip)
    Zip,
    /// RAR archive (.rar, .r00)
    Rar,
    /// Tarball (.tar, .tar.gz, .tgz)
    Tar,
}

impl MaterializerKind {
    /// Choose a strategy by file extension
    ///
    /// Only the name is inspected; the file's contents are never read.
    ///
    /// # Examples
    ///
    /// ```
    /// use xdcc_dl::types::MaterializerKind;
    /// use std::path::Path;
    ///
    /// assert_eq!(MaterializerKind::from_path(Path::new("show.rar")), MaterializerKind::Rar);
    /// assert_eq!(MaterializerKind::from_path(Path::new("pack.tar.gz")), MaterializerKind::Tar);
    /// assert_eq!(MaterializerKind::from_path(Path::new("movie.mkv")), MaterializerKind::Copy);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
        else {
            return MaterializerKind::Copy;
        };

        match ext.as_str() {
            "zip" => MaterializerKind::Zip,
            "rar" | "r00" => MaterializerKind::Rar,
            "tar" | "tgz" => MaterializerKind::Tar,
            "gz" if is_tar_gz(path) => MaterializerKind::Tar,
            _ => MaterializerKind::Copy,
        }
    }
}

impl std::fmt::Display for MaterializerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MaterializerKind::Copy => "copy",
            MaterializerKind::Zip => "zip",
            MaterializerKind::Rar => "rar",
            MaterializerKind::Tar => "tar",
        };
        f.write_str(name)
    }
}

/// True for `.tar.gz` and `.tgz` names
pub(crate) fn is_tar_gz(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            TransferStatus::Queued,
            TransferStatus::Incomplete,
            TransferStatus::Completed,
        ] {
            assert_eq!(TransferStatus::from_i32(status.to_i32()), status);
        }
        assert_eq!(TransferStatus::from_i32(99), TransferStatus::Incomplete);
    }

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(
            MaterializerKind::from_path(Path::new("/dl/Show.S01.ZIP")),
            MaterializerKind::Zip
        );
        assert_eq!(
            MaterializerKind::from_path(Path::new("/dl/show.part.r00")),
            MaterializerKind::Rar
        );
        assert_eq!(
            MaterializerKind::from_path(Path::new("/dl/bundle.TGZ")),
            MaterializerKind::Tar
        );
    }

    #[test]
    fn plain_gz_is_not_a_tarball() {
        assert_eq!(
            MaterializerKind::from_path(Path::new("/dl/notes.txt.gz")),
            MaterializerKind::Copy
        );
        assert_eq!(
            MaterializerKind::from_path(Path::new("/dl/README")),
            MaterializerKind::Copy
        );
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TransferStatus::Incomplete).unwrap();
        assert_eq!(json, "\"incomplete\"");
    }
}
