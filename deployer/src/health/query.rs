//! Health sub-queries over the remote transport

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::FleetError;
use crate::installers::docker_step;
use crate::models::health::{ContainerStatus, HostMetrics};
use crate::models::host::{HostDescriptor, HostId, OsFamily};
use crate::remote::{powershell, RemoteCommand, Transport};

/// The two independent health sub-queries
#[async_trait]
pub trait HealthQuery: Send + Sync {
    async fn query_metrics(&self, host: &HostDescriptor) -> Result<HostMetrics, FleetError>;

    async fn query_containers(
        &self,
        host: &HostDescriptor,
    ) -> Result<Vec<ContainerStatus>, FleetError>;
}

const LINUX_METRICS: &str = r#"s1=$(head -n1 /proc/stat); sleep 1; s2=$(head -n1 /proc/stat)
echo "$s1 $s2" | awk '{t1=$2+$3+$4+$5+$6+$7+$8; i1=$5+$6; t2=$13+$14+$15+$16+$17+$18+$19; i2=$16+$17; d=t2-t1; if (d>0) printf "cpu=%.1f\n", 100*(d-(i2-i1))/d; else print "cpu=0"}'
awk '/^MemTotal:/{t=$2} /^MemAvailable:/{a=$2} END{printf "mem_total=%.0f\nmem_used=%.0f\n", t*1024, (t-a)*1024}' /proc/meminfo
df -kP / | awk 'NR==2{printf "disk_total=%.0f\ndisk_used=%.0f\n", $2*1024, $3*1024}'
awk '{printf "uptime=%.0f\n", $1}' /proc/uptime"#;

const WINDOWS_METRICS: &str = r#"$os = Get-CimInstance Win32_OperatingSystem
$cpu = (Get-CimInstance Win32_Processor | Measure-Object -Property LoadPercentage -Average).Average
$disk = Get-CimInstance Win32_LogicalDisk -Filter "DeviceID='C:'"
"cpu=$cpu"
"mem_total=$($os.TotalVisibleMemorySize * 1024)"
"mem_used=$(($os.TotalVisibleMemorySize - $os.FreePhysicalMemory) * 1024)"
"disk_total=$($disk.Size)"
"disk_used=$($disk.Size - $disk.FreeSpace)"
"uptime=$([int]((Get-Date) - $os.LastBootUpTime).TotalSeconds)""#;

/// Container listing followed by live stats, split by a marker line
pub const CONTAINERS_SCRIPT: &str = "docker ps -a --format '{{json .}}' || exit $?\n\
     echo '---stats---'\n\
     docker stats --no-stream --format '{{json .}}' 2>/dev/null || true";

/// Parse `key=value` metric lines
pub fn parse_metrics(output: &str) -> Result<HostMetrics, FleetError> {
    let values: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let number = |key: &str| -> Result<f64, FleetError> {
        let raw = values.get(key).ok_or_else(|| {
            FleetError::HealthQueryError(format!("Metric '{}' missing from output", key))
        })?;
        raw.parse::<f64>().map_err(|_| {
            FleetError::HealthQueryError(format!("Metric '{}' is not a number: {}", key, raw))
        })
    };

    Ok(HostMetrics {
        cpu_percent: number("cpu")?.clamp(0.0, 100.0) as f32,
        memory_used: number("mem_used")?.max(0.0) as u64,
        memory_total: number("mem_total")?.max(0.0) as u64,
        disk_used: number("disk_used")?.max(0.0) as u64,
        disk_total: number("disk_total")?.max(0.0) as u64,
        uptime_secs: number("uptime")?.max(0.0) as u64,
    })
}

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatsLine {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu: String,
    #[serde(rename = "MemUsage", default)]
    mem: String,
}

/// Parse `docker ps` JSON lines merged with `docker stats` JSON lines
pub fn parse_containers(output: &str) -> Result<Vec<ContainerStatus>, FleetError> {
    let (ps, stats) = match output.split_once("---stats---") {
        Some((ps, stats)) => (ps, stats),
        None => (output, ""),
    };

    let mut usage: HashMap<String, StatsLine> = HashMap::new();
    for line in stats.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<StatsLine>(line) {
            Ok(stat) => {
                usage.insert(stat.name.clone(), stat);
            }
            Err(e) => debug!("Skipping unparsable stats line: {}", e),
        }
    }

    let mut containers = Vec::new();
    for line in ps.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let entry: PsLine = serde_json::from_str(line).map_err(|e| {
            FleetError::HealthQueryError(format!("Unexpected docker ps output: {}", e))
        })?;
        let stat = usage.get(&entry.names);
        containers.push(ContainerStatus {
            cpu_percent: stat.and_then(|s| s.cpu.trim_end_matches('%').trim().parse::<f32>().ok()),
            mem_usage: stat.map(|s| s.mem.trim().to_string()).filter(|m| !m.is_empty()),
            name: entry.names,
            image: entry.image,
            state: entry.state,
            status: entry.status,
        });
    }
    Ok(containers)
}

/// Health queries run as shell steps over the transport
pub struct ShellHealthQuery {
    transport: Arc<dyn Transport>,
    os_cache: Mutex<HashMap<HostId, OsFamily>>,
}

impl ShellHealthQuery {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            os_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn os_of(&self, host: &HostDescriptor) -> Result<OsFamily, FleetError> {
        let cached = self
            .os_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&host.id)
            .copied();
        if let Some(os) = cached {
            return Ok(os);
        }

        match self.transport.detect_os(host).await {
            OsFamily::Unknown => Err(FleetError::HealthQueryError(format!(
                "Could not determine the OS of {}",
                host.label()
            ))),
            os => {
                self.os_cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(host.id, os);
                Ok(os)
            }
        }
    }

    async fn run(&self, host: &HostDescriptor, command: &RemoteCommand) -> Result<String, FleetError> {
        let output = self.transport.exec(host, command).await?;
        Ok(output.into_result(&host.address)?.stdout)
    }
}

#[async_trait]
impl HealthQuery for ShellHealthQuery {
    async fn query_metrics(&self, host: &HostDescriptor) -> Result<HostMetrics, FleetError> {
        let command = match self.os_of(host).await? {
            OsFamily::Windows => RemoteCommand::new(powershell(WINDOWS_METRICS)),
            _ => RemoteCommand::new(LINUX_METRICS),
        };
        parse_metrics(&self.run(host, &command).await?)
    }

    async fn query_containers(
        &self,
        host: &HostDescriptor,
    ) -> Result<Vec<ContainerStatus>, FleetError> {
        let os = self.os_of(host).await?;
        let command = docker_step(os, CONTAINERS_SCRIPT);
        parse_containers(&self.run(host, &command).await?)
    }
}
