//! Configuration types for xdcc-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Transfer session configuration (download root, checkpointing, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Minimum time between progress checkpoints (default: 10 seconds)
    #[serde(default = "default_checkpoint_interval", with = "duration_serde")]
    pub checkpoint_interval: Duration,

    /// How long to wait for the peer to accept the connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// How the byte counter advances per chunk
    #[serde(default)]
    pub byte_accounting: ByteAccounting,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            checkpoint_interval: default_checkpoint_interval(),
            connect_timeout: default_connect_timeout(),
            byte_accounting: ByteAccounting::default(),
        }
    }
}

/// Byte counter accounting used by the transfer loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteAccounting {
    /// Advance by the nominal chunk size for every read (default, matches
    /// progress values written by earlier releases)
    #[default]
    Nominal,
    /// Advance by the number of bytes actually read
    Actual,
}

/// Materialization configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Root under which per-job extraction directories are created (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./xdcc-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// External resume command configuration
///
/// When `command` is set, a prematurely terminated transfer re-requests the
/// file from its peer by running this program. Context is passed through
/// `XDCC_DL_*` environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Program to run (absolute path, or a name looked up in PATH)
    #[serde(default)]
    pub command: Option<PathBuf>,

    /// Extra arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum run time before the command is abandoned (default: 5 minutes)
    #[serde(default = "default_resume_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout: default_resume_timeout(),
        }
    }
}

/// Main configuration for the engine
///
/// Fields are organized into sub-configs:
/// - [`transfer`](TransferConfig) - download root, checkpointing, timeouts
/// - [`materialize`](MaterializeConfig) - extraction temp root
/// - [`persistence`](PersistenceConfig) - database location
/// - [`resume`](ResumeConfig) - external resume command
///
/// `transfer` and `materialize` are flattened, so the serialized form keeps
/// `download_dir` and `temp_dir` at the top level.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer session settings
    #[serde(flatten)]
    pub transfer: TransferConfig,

    /// Materialization settings
    #[serde(flatten)]
    pub materialize: MaterializeConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// External resume command
    #[serde(default)]
    pub resume: ResumeConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.transfer.download_dir
    }

    /// Temporary directory root
    pub fn temp_dir(&self) -> &PathBuf {
        &self.materialize.temp_dir
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.transfer.checkpoint_interval.is_zero() {
            return Err(crate::Error::Config {
                message: "checkpoint interval must be greater than zero".to_string(),
                key: Some("checkpoint_interval".to_string()),
            });
        }
        if self.transfer.connect_timeout.is_zero() {
            return Err(crate::Error::Config {
                message: "connect timeout must be greater than zero".to_string(),
                key: Some("connect_timeout".to_string()),
            });
        }
        if self.transfer.download_dir == self.materialize.temp_dir {
            return Err(crate::Error::Config {
                message: "download_dir and temp_dir must differ".to_string(),
                key: Some("temp_dir".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./xdcc-dl.db")
}

fn default_checkpoint_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_resume_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.download_dir(), &PathBuf::from("./downloads"));
        assert_eq!(config.temp_dir(), &PathBuf::from("./temp"));
        assert_eq!(config.transfer.checkpoint_interval, Duration::from_secs(10));
        assert_eq!(config.transfer.byte_accounting, ByteAccounting::Nominal);
        assert!(config.resume.command.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn deserializes_flat_json_with_defaults() {
        let json = r#"{
            "download_dir": "/srv/dl",
            "temp_dir": "/srv/tmp",
            "byte_accounting": "actual",
            "resume": { "command": "xdcc-resume", "timeout": 60 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.transfer.download_dir, PathBuf::from("/srv/dl"));
        assert_eq!(config.materialize.temp_dir, PathBuf::from("/srv/tmp"));
        assert_eq!(config.transfer.byte_accounting, ByteAccounting::Actual);
        assert_eq!(config.transfer.checkpoint_interval, Duration::from_secs(10));
        assert_eq!(
            config.resume.command.as_deref(),
            Some(std::path::Path::new("xdcc-resume"))
        );
        assert_eq!(config.resume.timeout, Duration::from_secs(60));
        assert_eq!(
            config.persistence.database_path,
            PathBuf::from("./xdcc-dl.db")
        );
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.transfer.checkpoint_interval = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, crate::Error::Config { key: Some(k), .. } if k == "checkpoint_interval"));
    }

    #[test]
    fn validate_rejects_shared_download_and_temp_dir() {
        let mut config = Config::default();
        config.materialize.temp_dir = config.transfer.download_dir.clone();
        assert!(config.validate().is_err());
    }
}
