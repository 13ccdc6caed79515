//! Windows compatibility layer (WSL) and the reboot-and-wait protocol

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::installers::{InstallOutcome, InstallTarget, Installer};
use crate::models::host::HostDescriptor;
use crate::remote::{powershell, RemoteCommand, Transport};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Exit code Windows installers use for "success, restart required"
const ERROR_SUCCESS_REBOOT_REQUIRED: i32 = 3010;

/// Command line running `script` as root inside the default WSL distribution.
///
/// The script travels base64 encoded so neither cmd.exe nor PowerShell
/// reinterpret its quoting.
pub fn wsl_line(script: &str) -> String {
    format!(
        "wsl -u root -e sh -c \"echo {} | base64 -d | sh\"",
        STANDARD.encode(script)
    )
}

#[derive(Debug, Clone)]
pub struct RebootOptions {
    /// Reboot the host ourselves when WSL asks for it
    pub auto_reboot: bool,

    /// How long to wait for the host to come back
    pub timeout: Duration,

    /// Delay between reachability checks while waiting
    pub cooldown: CooldownOptions,
}

impl Default for RebootOptions {
    fn default() -> Self {
        Self {
            auto_reboot: true,
            timeout: Duration::from_secs(600),
            cooldown: CooldownOptions {
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(30),
                multiplier: 1.5,
            },
        }
    }
}

pub struct WslInstaller {
    transport: Arc<dyn Transport>,
    options: RebootOptions,
}

impl WslInstaller {
    pub fn new(transport: Arc<dyn Transport>, options: RebootOptions) -> Self {
        Self { transport, options }
    }

    /// Whether WSL can start a distribution right now
    async fn is_ready(&self, host: &HostDescriptor) -> bool {
        let probe = RemoteCommand::new(powershell("wsl.exe -e true; exit $LASTEXITCODE"));
        matches!(self.transport.exec(host, &probe).await, Ok(output) if output.success())
    }

    /// Poll reachability until it reads `want`, or give up at `deadline`
    async fn wait_until(&self, host: &HostDescriptor, want: bool, deadline: Instant) -> bool {
        let mut attempt = 0;
        loop {
            if self.transport.test_reachable(host).await == want {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let delay = calc_exp_backoff(&self.options.cooldown, attempt).min(deadline - now);
            attempt += 1;
            let goal = if want { "come back" } else { "go down" };
            debug!("Waiting for {} to {}, next check in {:?}", host.label(), goal, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Reboot `host`, see it go down, then wait until it accepts logins again
    async fn reboot_and_wait(&self, host: &HostDescriptor) -> bool {
        info!("Rebooting {} to finish the WSL install", host.label());
        let restart = RemoteCommand::new(powershell("Restart-Computer -Force"));
        if let Err(e) = self.transport.exec(host, &restart).await {
            // the session usually drops mid-command
            debug!("Restart request on {} ended with: {}", host.label(), e);
        }

        let deadline = Instant::now() + self.options.timeout;
        if !self.wait_until(host, false, deadline).await {
            warn!(
                "{} stayed reachable for {:?} after the restart request",
                host.label(),
                self.options.timeout
            );
            return false;
        }
        debug!("{} went down", host.label());

        if !self.wait_until(host, true, deadline).await {
            warn!(
                "{} did not come back within {:?}",
                host.label(),
                self.options.timeout
            );
            return false;
        }
        info!("{} is back after reboot", host.label());
        true
    }
}

#[async_trait]
impl Installer for WslInstaller {
    fn name(&self) -> &str {
        "WSL"
    }

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome {
        let host = target.host;
        if self.is_ready(host).await {
            debug!("WSL already usable on {}", host.label());
            return InstallOutcome::Structured {
                success: true,
                needs_reboot: false,
                ready: true,
            };
        }

        let install = RemoteCommand::new(powershell(
            "wsl.exe --install -d Ubuntu --no-launch; exit $LASTEXITCODE",
        ));
        let output = match self.transport.exec(host, &install).await {
            Ok(output) => output,
            Err(e) => {
                warn!("WSL install could not run on {}: {}", host.label(), e);
                return InstallOutcome::Structured {
                    success: false,
                    needs_reboot: false,
                    ready: false,
                };
            }
        };

        let mentions_restart = {
            let text = format!("{}{}", output.stdout, output.stderr).to_lowercase();
            text.contains("restart") || text.contains("reboot")
        };
        let needs_reboot =
            output.exit_code == Some(ERROR_SUCCESS_REBOOT_REQUIRED) || mentions_restart;
        let success = output.success() || needs_reboot;
        if !success {
            warn!(
                "WSL install failed on {}: {}",
                host.label(),
                output.stderr.trim()
            );
            return InstallOutcome::Structured {
                success: false,
                needs_reboot: false,
                ready: false,
            };
        }

        let ready = if needs_reboot {
            self.options.auto_reboot && self.reboot_and_wait(host).await && self.is_ready(host).await
        } else {
            self.is_ready(host).await
        };

        InstallOutcome::Structured {
            success: true,
            needs_reboot,
            ready,
        }
    }
}
