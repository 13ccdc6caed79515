//! Health snapshot models

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::host::HostId;

/// Overall health classification of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Error => "error",
        }
    }
}

/// Resource usage of a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_percent: f32,

    /// Memory usage in bytes
    pub memory_used: u64,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Disk usage in bytes (root filesystem)
    pub disk_used: u64,

    /// Total disk space in bytes
    pub disk_total: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl HostMetrics {
    pub fn memory_percent(&self) -> f32 {
        percent(self.memory_used, self.memory_total)
    }

    pub fn disk_percent(&self) -> f32 {
        percent(self.disk_used, self.disk_total)
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total > 0 {
        (used as f32 / total as f32) * 100.0
    } else {
        0.0
    }
}

/// Run state and resource usage of one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub image: String,
    /// Docker state: running, exited, restarting, ...
    pub state: String,
    /// Docker status line, e.g. "Up 3 hours"
    pub status: String,
    #[serde(default)]
    pub cpu_percent: Option<f32>,
    #[serde(default)]
    pub mem_usage: Option<String>,
}

/// Most recent health state of one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub host_id: HostId,
    pub address: String,
    pub status: HealthStatus,
    pub metrics: Option<HostMetrics>,
    pub containers: Vec<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers_error: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Plain-text block for exported reports
    pub fn to_report_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Host #{} {} [{}] captured {}",
            self.host_id,
            self.address,
            self.status.as_str(),
            self.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        match (&self.metrics, &self.metrics_error) {
            (Some(m), _) => {
                let _ = writeln!(
                    out,
                    "  CPU: {:.1}%  Memory: {} / {} ({:.1}%)  Disk: {} / {} ({:.1}%)  Uptime: {}",
                    m.cpu_percent,
                    format_bytes(m.memory_used),
                    format_bytes(m.memory_total),
                    m.memory_percent(),
                    format_bytes(m.disk_used),
                    format_bytes(m.disk_total),
                    m.disk_percent(),
                    format_uptime(m.uptime_secs)
                );
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "  Metrics error: {}", err);
            }
            (None, None) => {
                let _ = writeln!(out, "  Metrics: unavailable");
            }
        }

        if let Some(err) = &self.containers_error {
            let _ = writeln!(out, "  Containers error: {}", err);
        } else {
            let running = self.containers.iter().filter(|c| c.state == "running").count();
            let _ = writeln!(
                out,
                "  Containers: {} total, {} running",
                self.containers.len(),
                running
            );
            for c in &self.containers {
                let _ = write!(out, "    - {} ({}) {}: {}", c.name, c.image, c.state, c.status);
                if let Some(cpu) = c.cpu_percent {
                    let _ = write!(out, ", cpu {:.1}%", cpu);
                }
                if let Some(mem) = &c.mem_usage {
                    let _ = write!(out, ", mem {}", mem);
                }
                out.push('\n');
            }
        }

        out.trim_end().to_string()
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format seconds as `3d 4h 12m`
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
