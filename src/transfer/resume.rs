//! Resume actions for prematurely terminated transfers
//!
//! When a session ends short of its expected size, the engine asks the peer to
//! send the rest. How that request is made is outside this crate, so it sits
//! behind the [`ResumeTrigger`] trait. [`CommandResumeTrigger`] runs an
//! external program with the context passed through environment variables.

use crate::config::ResumeConfig;
use crate::db::TransferRequest;
use crate::error::{Error, Result};
use crate::types::PeerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a resume action needs to re-request a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeContext {
    /// Peer the file was requested from
    pub peer_id: PeerId,
    /// Network the peer lives on
    pub network: String,
    /// Nickname of the bot serving the file
    pub bot: String,
    /// Pack identifier, when the request recorded one
    pub pack: Option<String>,
    /// File name as offered by the peer
    pub file_name: String,
    /// Local destination path
    pub destination: PathBuf,
    /// Byte offset to resume from (the on-disk size)
    pub resume_offset: u64,
}

impl ResumeContext {
    /// Build a context from the request that started the session
    ///
    /// Returns `None` unless the request names a peer, a network and a bot.
    pub fn from_request(
        request: &TransferRequest,
        destination: &Path,
        resume_offset: u64,
    ) -> Option<Self> {
        Some(Self {
            peer_id: request.peer_id?,
            network: request.network.clone().filter(|n| !n.is_empty())?,
            bot: request.bot.clone().filter(|b| !b.is_empty())?,
            pack: request.pack.clone(),
            file_name: request.file_name.clone(),
            destination: destination.to_path_buf(),
            resume_offset,
        })
    }

    /// Environment variables describing this context
    pub fn env_vars(&self) -> HashMap<String, String> {
        let mut env_vars = HashMap::new();
        env_vars.insert("XDCC_DL_NETWORK".to_string(), self.network.clone());
        env_vars.insert("XDCC_DL_BOT".to_string(), self.bot.clone());
        env_vars.insert("XDCC_DL_FILE".to_string(), self.file_name.clone());
        env_vars.insert("XDCC_DL_PEER_ID".to_string(), self.peer_id.to_string());
        env_vars.insert(
            "XDCC_DL_DESTINATION".to_string(),
            self.destination.display().to_string(),
        );
        env_vars.insert(
            "XDCC_DL_RESUME_OFFSET".to_string(),
            self.resume_offset.to_string(),
        );
        if let Some(pack) = &self.pack {
            env_vars.insert("XDCC_DL_PACK".to_string(), pack.clone());
        }
        env_vars
    }
}

/// Action that asks a peer to continue a transfer
#[async_trait]
pub trait ResumeTrigger: Send + Sync {
    /// Request the rest of the file described by `context`
    ///
    /// Runs in its own task; the engine clears the record's resume state once
    /// this returns, whatever the result.
    async fn request_resume(&self, context: &ResumeContext) -> Result<()>;

    /// Name used in log output
    fn name(&self) -> &'static str;
}

/// Trigger that does nothing, used when no resume command is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpResumeTrigger;

#[async_trait]
impl ResumeTrigger for NoOpResumeTrigger {
    async fn request_resume(&self, context: &ResumeContext) -> Result<()> {
        tracing::debug!(
            file = %context.file_name,
            offset = context.resume_offset,
            "no resume command configured"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Trigger that runs an external program
///
/// The program receives `XDCC_DL_NETWORK`, `XDCC_DL_BOT`, `XDCC_DL_PACK`,
/// `XDCC_DL_FILE`, `XDCC_DL_PEER_ID`, `XDCC_DL_DESTINATION` and
/// `XDCC_DL_RESUME_OFFSET`. A non-zero exit or running past the timeout is
/// reported as [`Error::ExternalTool`].
#[derive(Debug, Clone)]
pub struct CommandResumeTrigger {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandResumeTrigger {
    /// Create a trigger for an already resolved program path
    pub fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    /// Build a trigger from configuration
    ///
    /// Returns `Ok(None)` when no command is configured. Bare program names
    /// are looked up in `PATH`.
    pub fn from_config(config: &ResumeConfig) -> Result<Option<Self>> {
        let Some(command) = &config.command else {
            return Ok(None);
        };

        let program = if command.components().count() > 1 {
            command.clone()
        } else {
            which::which(command).map_err(|e| Error::Config {
                message: format!("resume command {} not found: {}", command.display(), e),
                key: Some("resume.command".to_string()),
            })?
        };

        Ok(Some(Self::new(
            program,
            config.args.clone(),
            config.timeout,
        )))
    }

    /// Resolved program path
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ResumeTrigger for CommandResumeTrigger {
    async fn request_resume(&self, context: &ResumeContext) -> Result<()> {
        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .envs(context.env_vars())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                tracing::debug!(program = ?self.program, file = %context.file_name, "resume command succeeded");
                Ok(())
            }
            Ok(Ok(output)) => Err(Error::ExternalTool(format!(
                "resume command {} exited with code {:?}",
                self.program.display(),
                output.status.code()
            ))),
            Ok(Err(e)) => Err(Error::ExternalTool(format!(
                "failed to run resume command {}: {}",
                self.program.display(),
                e
            ))),
            Err(_) => Err(Error::ExternalTool(format!(
                "resume command {} timed out after {:?}",
                self.program.display(),
                self.timeout
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
