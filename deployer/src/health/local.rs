//! Health of the machine homefleet itself runs on

use std::process::Stdio;

use async_trait::async_trait;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::process::Command;

use crate::errors::FleetError;
use crate::health::query::{parse_containers, HealthQuery, CONTAINERS_SCRIPT};
use crate::models::health::{ContainerStatus, HostMetrics};
use crate::models::host::HostDescriptor;

/// Sample CPU, memory, root disk and uptime of this machine
pub fn collect_metrics() -> HostMetrics {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next());
    let (disk_used, disk_total) = root
        .map(|d| (d.total_space().saturating_sub(d.available_space()), d.total_space()))
        .unwrap_or((0, 0));

    HostMetrics {
        cpu_percent: sys.global_cpu_usage().clamp(0.0, 100.0),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
        disk_used,
        disk_total,
        uptime_secs: System::uptime(),
    }
}

/// In-process health query for loopback hosts
#[derive(Debug, Default)]
pub struct LocalHealthQuery;

#[async_trait]
impl HealthQuery for LocalHealthQuery {
    async fn query_metrics(&self, _host: &HostDescriptor) -> Result<HostMetrics, FleetError> {
        tokio::task::spawn_blocking(collect_metrics)
            .await
            .map_err(|e| FleetError::HealthQueryError(format!("Metrics sampling failed: {}", e)))
    }

    async fn query_containers(
        &self,
        _host: &HostDescriptor,
    ) -> Result<Vec<ContainerStatus>, FleetError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(CONTAINERS_SCRIPT)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(FleetError::HealthQueryError(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_containers(&String::from_utf8_lossy(&output.stdout))
    }
}
