//! SSH transport backed by the system `ssh` client

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::FleetError;
use crate::models::host::{HostDescriptor, OsFamily};
use crate::remote::probe::tcp_probe;
use crate::remote::{powershell, shell_quote, CommandOutput, RemoteCommand, Transport};

/// SSH transport options
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// ssh client binary
    pub binary: String,

    /// Remote port
    pub port: u16,

    /// TCP and login timeout
    pub connect_timeout: Duration,

    /// Refuse unknown host keys instead of accepting new ones
    pub strict_host_key_checking: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            port: 22,
            connect_timeout: Duration::from_secs(5),
            strict_host_key_checking: false,
        }
    }
}

/// How a host's secret is presented to ssh
#[derive(Clone, Copy)]
enum Auth<'a> {
    IdentityFile(&'a str),
    Password(&'a str),
    Agent,
}

fn auth_for(host: &HostDescriptor) -> Auth<'_> {
    let secret = host.secret.expose_secret();
    if secret.is_empty() {
        Auth::Agent
    } else if Path::new(secret).is_file() {
        Auth::IdentityFile(secret)
    } else {
        Auth::Password(secret)
    }
}

/// Runs remote steps through `ssh`, falling back to `sshpass` for passwords
pub struct SshTransport {
    options: SshOptions,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn command_for(&self, host: &HostDescriptor, remote: &str) -> Command {
        let auth = auth_for(host);

        let mut cmd = match auth {
            Auth::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(&self.options.binary);
                cmd.env("SSHPASS", password);
                cmd
            }
            _ => Command::new(&self.options.binary),
        };

        let host_key_policy = if self.options.strict_host_key_checking {
            "yes"
        } else {
            "accept-new"
        };
        cmd.arg("-p")
            .arg(self.options.port.to_string())
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.options.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg(format!("StrictHostKeyChecking={}", host_key_policy));

        match auth {
            Auth::IdentityFile(path) => {
                cmd.args(["-i", path, "-o", "BatchMode=yes"]);
            }
            Auth::Agent => {
                cmd.args(["-o", "BatchMode=yes"]);
            }
            Auth::Password(_) => {
                cmd.args(["-o", "PubkeyAuthentication=no"]);
            }
        }

        // `--` ends option parsing so an address can never be read as a flag
        cmd.arg("-l").arg(&host.user).arg("--").arg(&host.address).arg(remote);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Remote command line for `command`, wrapped in sudo when elevated
    fn remote_line(host: &HostDescriptor, command: &RemoteCommand) -> (String, Option<SecretString>) {
        if !command.elevated {
            return (command.script.clone(), command.stdin.clone());
        }

        let inner = format!("sh -c {}", shell_quote(&command.script));
        match (auth_for(host), &command.stdin) {
            (Auth::Password(password), None) if host.user != "root" => (
                format!("sudo -S -p '' {}", inner),
                Some(SecretString::from(format!("{}\n", password))),
            ),
            (_, stdin) if host.user == "root" => (inner, stdin.clone()),
            (_, stdin) => (format!("sudo -n {}", inner), stdin.clone()),
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn test_reachable(&self, host: &HostDescriptor) -> bool {
        if !tcp_probe(&host.address, self.options.port, self.options.connect_timeout).await {
            return false;
        }
        match self.exec(host, &RemoteCommand::new("exit 0")).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(
                    "Login to {} failed: {}",
                    host.label(),
                    output.stderr.trim()
                );
                false
            }
            Err(e) => {
                warn!("Login to {} failed: {}", host.label(), e);
                false
            }
        }
    }

    async fn detect_os(&self, host: &HostDescriptor) -> OsFamily {
        if let Ok(output) = self.exec(host, &RemoteCommand::new("uname -s")).await {
            if output.success() && output.stdout.trim().eq_ignore_ascii_case("linux") {
                return OsFamily::Linux;
            }
        }

        let probe = powershell("[Environment]::OSVersion.Platform");
        if let Ok(output) = self.exec(host, &RemoteCommand::new(probe)).await {
            if output.success() && output.stdout.contains("Win32NT") {
                return OsFamily::Windows;
            }
        }

        info!("Could not classify OS of {}", host.label());
        OsFamily::Unknown
    }

    async fn exec(
        &self,
        host: &HostDescriptor,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, FleetError> {
        let (line, stdin) = Self::remote_line(host, command);
        debug!("ssh {}: {}", host.label(), line);

        let mut child = self
            .command_for(host, &line)
            .spawn()
            .map_err(|e| FleetError::TransportError(format!("Failed to run ssh: {}", e)))?;

        if let Some(mut pipe) = child.stdin.take() {
            if let Some(data) = stdin {
                if let Err(e) = pipe.write_all(data.expose_secret().as_bytes()).await {
                    debug!("Remote side closed stdin early on {}: {}", host.label(), e);
                }
            }
            // Dropping the pipe sends EOF.
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
