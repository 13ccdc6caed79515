//! Installer seam
//!
//! Every prerequisite and service is installed through the same [`Installer`]
//! contract. Installers never return errors: whatever goes wrong on the remote
//! side is logged and folded into an [`InstallOutcome`].

pub mod docker;
pub mod registry;
pub mod services;
pub mod windows;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::host::{HostDescriptor, OsFamily, Service};
use crate::remote::{RemoteCommand, Transport};

/// Result shape an installer may report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Plain success/failure
    Legacy(bool),

    /// Outcome of an install that may need a reboot before it is usable
    Structured {
        success: bool,
        needs_reboot: bool,
        ready: bool,
    },
}

/// What the pipeline should do after the compatibility-layer install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatDecision {
    Proceed,
    Failed,
    RebootRequired,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        match *self {
            InstallOutcome::Legacy(success) => success,
            InstallOutcome::Structured { success, .. } => success,
        }
    }

    /// Normalize either shape into one decision
    pub fn decision(&self) -> CompatDecision {
        match *self {
            InstallOutcome::Legacy(true) => CompatDecision::Proceed,
            InstallOutcome::Legacy(false) => CompatDecision::Failed,
            InstallOutcome::Structured { success: false, .. } => CompatDecision::Failed,
            InstallOutcome::Structured {
                needs_reboot: true,
                ready: false,
                ..
            } => CompatDecision::RebootRequired,
            InstallOutcome::Structured { .. } => CompatDecision::Proceed,
        }
    }
}

impl From<bool> for InstallOutcome {
    fn from(success: bool) -> Self {
        InstallOutcome::Legacy(success)
    }
}

/// Everything an installer may need to know about the host it acts on
#[derive(Debug, Clone, Copy)]
pub struct InstallTarget<'a> {
    pub host: &'a HostDescriptor,
    pub os: OsFamily,
    pub service: Option<Service>,
    pub domain: Option<&'a str>,
    /// Whether the reverse proxy came up earlier in this pipeline
    pub proxy_available: bool,
}

/// Installs one thing on one host
#[async_trait]
pub trait Installer: Send + Sync {
    /// Short name used in progress messages
    fn name(&self) -> &str;

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome;
}

/// A docker-level step: native with sudo on Linux, as root inside WSL on Windows
pub fn docker_step(os: OsFamily, script: &str) -> RemoteCommand {
    match os {
        OsFamily::Windows => RemoteCommand::new(windows::wsl_line(script)),
        _ => RemoteCommand::new(script).elevated(),
    }
}

/// Run one step, logging rather than propagating failures
pub async fn run_step(
    transport: &dyn Transport,
    host: &HostDescriptor,
    what: &str,
    command: &RemoteCommand,
) -> bool {
    match transport.exec(host, command).await {
        Ok(output) => match output.into_result(&host.address) {
            Ok(_) => {
                debug!("{} succeeded on {}", what, host.label());
                true
            }
            Err(e) => {
                warn!("{} failed on {}: {}", what, host.label(), e);
                false
            }
        },
        Err(e) => {
            warn!("{} could not run on {}: {}", what, host.label(), e);
            false
        }
    }
}
