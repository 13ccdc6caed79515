//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::FleetError;
use crate::fanout::scheduler::MAX_WORKERS;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::workers::refresh::RefreshInterval;

/// homefleet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write a daily log file under the logs directory
    #[serde(default = "default_true")]
    pub log_file: bool,

    /// Upper bound on concurrently running host pipelines
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Completion poller tick in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single pipeline stage
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub windows: WindowsSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    32
}

fn default_poll_interval_ms() -> u64 {
    150
}

fn default_stage_timeout_secs() -> u64 {
    900
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_file: true,
            max_concurrency: default_max_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            stage_timeout_secs: default_stage_timeout_secs(),
            ssh: SshSettings::default(),
            windows: WindowsSettings::default(),
            proxy: ProxySettings::default(),
            health: HealthSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, FleetError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings: Settings = file
            .read_json()
            .await
            .map_err(|e| FleetError::ConfigError(format!("{}: {}", file.path().display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn save(&self, file: &File) -> Result<(), FleetError> {
        file.write_json(self).await
    }

    pub fn validate(&self) -> Result<(), FleetError> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_WORKERS {
            return Err(FleetError::ConfigError(format!(
                "max_concurrency must be between 1 and {}, got {}",
                MAX_WORKERS, self.max_concurrency
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(FleetError::ConfigError(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.health.warning_pct > self.health.critical_pct {
            return Err(FleetError::ConfigError(format!(
                "health.warning_pct ({}) exceeds health.critical_pct ({})",
                self.health.warning_pct, self.health.critical_pct
            )));
        }
        Ok(())
    }
}

/// SSH client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_ssh_binary")]
    pub binary: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Refuse unknown host keys instead of accepting them on first use
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: default_ssh_binary(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            strict_host_key_checking: false,
        }
    }
}

/// Windows host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsSettings {
    /// Reboot automatically when WSL needs it
    #[serde(default = "default_true")]
    pub auto_reboot: bool,

    #[serde(default = "default_reboot_timeout_secs")]
    pub reboot_timeout_secs: u64,
}

fn default_reboot_timeout_secs() -> u64 {
    600
}

impl Default for WindowsSettings {
    fn default() -> Self {
        Self {
            auto_reboot: true,
            reboot_timeout_secs: default_reboot_timeout_secs(),
        }
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Services are published as `<service>.<domain>` when set
    #[serde(default)]
    pub domain: Option<String>,
}

/// Health poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Auto-refresh interval enabled at startup in serve mode
    #[serde(default)]
    pub auto_refresh: Option<RefreshInterval>,

    #[serde(default = "default_warning_pct")]
    pub warning_pct: f32,

    #[serde(default = "default_critical_pct")]
    pub critical_pct: f32,
}

fn default_warning_pct() -> f32 {
    75.0
}

fn default_critical_pct() -> f32 {
    90.0
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            auto_refresh: None,
            warning_pct: default_warning_pct(),
            critical_pct: default_critical_pct(),
        }
    }
}

/// Local control API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8470
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
