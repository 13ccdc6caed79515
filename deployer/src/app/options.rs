//! Application configuration options

use std::time::Duration;

use crate::deploy::pipeline::PipelineOptions;
use crate::fanout::poller;
use crate::health::pipeline::Thresholds;
use crate::installers::windows::RebootOptions;
use crate::remote::ssh::SshOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::refresh::RefreshInterval;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Upper bound on concurrently running host pipelines
    pub max_concurrency: usize,

    /// Completion poller options
    pub poller: poller::Options,

    /// Deployment pipeline options
    pub pipeline: PipelineOptions,

    /// SSH transport options
    pub ssh: SshOptions,

    /// Windows reboot-and-wait options
    pub reboot: RebootOptions,

    /// Health classification thresholds
    pub thresholds: Thresholds,

    /// Auto-refresh enabled when serving
    pub auto_refresh: Option<RefreshInterval>,

    /// Server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

impl AppOptions {
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let reboot = RebootOptions {
            auto_reboot: settings.windows.auto_reboot,
            timeout: Duration::from_secs(settings.windows.reboot_timeout_secs),
            ..RebootOptions::default()
        };

        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            max_concurrency: settings.max_concurrency,
            poller: poller::Options {
                interval: Duration::from_millis(settings.poll_interval_ms),
            },
            pipeline: PipelineOptions {
                stage_timeout: Duration::from_secs(settings.stage_timeout_secs),
                domain: settings
                    .proxy
                    .domain
                    .clone()
                    .filter(|d| !d.trim().is_empty()),
            },
            ssh: SshOptions {
                binary: settings.ssh.binary.clone(),
                port: settings.ssh.port,
                connect_timeout: Duration::from_secs(settings.ssh.connect_timeout_secs),
                strict_host_key_checking: settings.ssh.strict_host_key_checking,
            },
            reboot,
            thresholds: Thresholds {
                warning_pct: settings.health.warning_pct,
                critical_pct: settings.health.critical_pct,
            },
            auto_refresh: settings.health.auto_refresh,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8470,
        }
    }
}
