//! Remote transport seam
//!
//! The orchestrator only needs three capabilities from a transport: a
//! reachability test, an OS classification, and running one remote step.

pub mod probe;
pub mod ssh;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::SecretString;

use crate::errors::FleetError;
use crate::models::host::{HostDescriptor, OsFamily};

/// Quote `s` as a single POSIX shell word
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Wrap a PowerShell script so it survives any remote default shell
pub fn powershell(script: &str) -> String {
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    format!(
        "powershell -NoProfile -NonInteractive -EncodedCommand {}",
        STANDARD.encode(utf16)
    )
}

/// A single remote step
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    /// Command line handed to the remote login shell
    pub script: String,

    /// Run through `sudo` (POSIX hosts only)
    pub elevated: bool,

    /// Data written to the remote process's stdin
    pub stdin: Option<SecretString>,
}

impl RemoteCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            elevated: false,
            stdin: None,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn with_stdin(mut self, stdin: SecretString) -> Self {
        self.stdin = Some(stdin);
        self
    }
}

/// Captured output of a remote step
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Error for a non-zero exit, carrying the most useful output line
    pub fn into_result(self, address: &str) -> Result<CommandOutput, FleetError> {
        if self.success() {
            return Ok(self);
        }
        let detail = last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .unwrap_or_else(|| "no output".to_string());
        Err(FleetError::RemoteCommandFailed {
            address: address.to_string(),
            message: format!("exit code {:?}: {}", self.exit_code, detail),
        })
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}

/// Reachability, OS detection, and remote execution for one host at a time
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the host accepts a login with its credentials
    async fn test_reachable(&self, host: &HostDescriptor) -> bool;

    /// Classify the host's operating system
    async fn detect_os(&self, host: &HostDescriptor) -> OsFamily;

    /// Run one step on the host
    async fn exec(
        &self,
        host: &HostDescriptor,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, FleetError>;
}
