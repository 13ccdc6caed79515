//! Per-host health pipeline

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::fanout::channel::HostEmitter;
use crate::fanout::scheduler::TerminalValue;
use crate::health::query::HealthQuery;
use crate::models::health::{HealthSnapshot, HealthStatus, HostMetrics};
use crate::models::host::HostDescriptor;
use crate::remote::probe::is_loopback;

impl TerminalValue for HealthSnapshot {
    fn worker_lost(host: &HostDescriptor, reason: &str) -> Self {
        HealthSnapshot {
            host_id: host.id,
            address: host.address.clone(),
            status: HealthStatus::Error,
            metrics: None,
            containers: Vec::new(),
            metrics_error: Some(format!("worker lost: {}", reason)),
            containers_error: None,
            captured_at: Utc::now(),
        }
    }
}

/// Usage thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning_pct: f32,
    pub critical_pct: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_pct: 75.0,
            critical_pct: 90.0,
        }
    }
}

impl Thresholds {
    /// Classify by the highest of CPU, memory and disk usage
    pub fn classify(&self, metrics: &HostMetrics) -> HealthStatus {
        let peak = metrics
            .cpu_percent
            .max(metrics.memory_percent())
            .max(metrics.disk_percent());
        if peak >= self.critical_pct {
            HealthStatus::Critical
        } else if peak >= self.warning_pct {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Overall status from the two sub-query outcomes
pub fn overall_status(
    metrics: Option<&HostMetrics>,
    containers_ok: bool,
    thresholds: &Thresholds,
) -> HealthStatus {
    match metrics {
        None => HealthStatus::Error,
        Some(m) => match thresholds.classify(m) {
            HealthStatus::Healthy if !containers_ok => HealthStatus::Warning,
            status => status,
        },
    }
}

#[derive(Clone)]
pub struct HealthPipeline {
    remote: Arc<dyn HealthQuery>,
    local: Arc<dyn HealthQuery>,
    thresholds: Thresholds,
}

impl HealthPipeline {
    pub fn new(
        remote: Arc<dyn HealthQuery>,
        local: Arc<dyn HealthQuery>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            remote,
            local,
            thresholds,
        }
    }

    /// Query `host` and build its snapshot. Always yields exactly one snapshot.
    pub async fn run(&self, host: HostDescriptor, events: HostEmitter) -> HealthSnapshot {
        let query = if is_loopback(&host.address) {
            debug!("Measuring {} in-process", host.label());
            self.local.as_ref()
        } else {
            self.remote.as_ref()
        };

        events.info("Querying health");
        let (metrics, containers) =
            tokio::join!(query.query_metrics(&host), query.query_containers(&host));

        let (metrics, metrics_error) = match metrics {
            Ok(m) => (Some(m), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let (containers, containers_error) = match containers {
            Ok(c) => (c, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let status = overall_status(
            metrics.as_ref(),
            containers_error.is_none(),
            &self.thresholds,
        );
        let message = match (&metrics_error, &containers_error) {
            (Some(e), _) => format!("Metrics unavailable: {}", e),
            (None, Some(e)) => format!("{}, containers unavailable: {}", status.as_str(), e),
            (None, None) => format!(
                "{}, {} container(s)",
                status.as_str(),
                containers.len()
            ),
        };
        match status {
            HealthStatus::Healthy => events.success(message),
            HealthStatus::Warning => events.warning(message),
            HealthStatus::Critical | HealthStatus::Error => events.error(message),
        }

        HealthSnapshot {
            host_id: host.id,
            address: host.address.clone(),
            status,
            metrics,
            containers,
            metrics_error,
            containers_error,
            captured_at: Utc::now(),
        }
    }
}
