//! Mock collaborators shared by the integration tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use homefleet::deploy::orchestrator::Deployer;
use homefleet::deploy::pipeline::{DeployPipeline, PipelineOptions};
use homefleet::errors::FleetError;
use homefleet::fanout::poller;
use homefleet::installers::registry::{InstallerRegistry, PlatformInstallers};
use homefleet::installers::{InstallOutcome, InstallTarget, Installer};
use homefleet::models::health::{ContainerStatus, HostMetrics};
use homefleet::models::host::{HostDescriptor, HostId, OsFamily, Service};
use homefleet::remote::{CommandOutput, RemoteCommand, Transport};

pub fn host(id: HostId, address: &str, service: Option<Service>) -> HostDescriptor {
    HostDescriptor::new(id, address, "pi", "hunter2", service)
}

pub fn fast_poll() -> poller::Options {
    poller::Options {
        interval: Duration::from_millis(5),
    }
}

// ================================ TRANSPORT ===================================== //

#[derive(Default)]
pub struct MockTransport {
    unreachable: HashSet<String>,
    os: HashMap<String, OsFamily>,
    panics_on: HashSet<String>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    pub fn with_os(mut self, address: &str, os: OsFamily) -> Self {
        self.os.insert(address.to_string(), os);
        self
    }

    pub fn panics_on(mut self, address: &str) -> Self {
        self.panics_on.insert(address.to_string());
        self
    }

    /// Time spent in every connection test
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most connection tests observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn test_reachable(&self, host: &HostDescriptor) -> bool {
        if self.panics_on.contains(&host.address) {
            panic!("transport blew up for {}", host.address);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        !self.unreachable.contains(&host.address)
    }

    async fn detect_os(&self, host: &HostDescriptor) -> OsFamily {
        self.os.get(&host.address).copied().unwrap_or(OsFamily::Linux)
    }

    async fn exec(
        &self,
        _host: &HostDescriptor,
        _command: &RemoteCommand,
    ) -> Result<CommandOutput, FleetError> {
        Ok(CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

// ================================ INSTALLERS ==================================== //

pub struct MockInstaller {
    name: String,
    default: InstallOutcome,
    per_address: HashMap<String, InstallOutcome>,
    calls: Mutex<Vec<(String, bool)>>,
}

impl MockInstaller {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: InstallOutcome::Legacy(true),
            per_address: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            default: InstallOutcome::Legacy(false),
            ..Self::ok(name)
        }
    }

    pub fn outcome_on(mut self, address: &str, outcome: InstallOutcome) -> Self {
        self.per_address.insert(address.to_string(), outcome);
        self
    }

    /// Addresses this installer ran on, with the proxy flag it saw
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for MockInstaller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((target.host.address.clone(), target.proxy_available));
        self.per_address
            .get(&target.host.address)
            .copied()
            .unwrap_or(self.default)
    }
}

/// One mock per stage, wired into a registry
pub struct Fixture {
    pub compat: Arc<MockInstaller>,
    pub runtime: Arc<MockInstaller>,
    pub proxy: Arc<MockInstaller>,
    pub service: Arc<MockInstaller>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            compat: Arc::new(MockInstaller::ok("WSL")),
            runtime: Arc::new(MockInstaller::ok("docker")),
            proxy: Arc::new(MockInstaller::ok("reverse proxy")),
            service: Arc::new(MockInstaller::ok("service")),
        }
    }
}

impl Fixture {
    pub fn registry(&self) -> InstallerRegistry {
        let linux = PlatformInstallers {
            compat_layer: None,
            runtime: self.runtime.clone(),
            reverse_proxy: self.proxy.clone(),
        };
        let windows = PlatformInstallers {
            compat_layer: Some(self.compat.clone()),
            runtime: self.runtime.clone(),
            reverse_proxy: self.proxy.clone(),
        };
        Service::ALL
            .iter()
            .fold(InstallerRegistry::new(linux, windows), |registry, service| {
                registry.with_service(*service, self.service.clone())
            })
    }

    pub fn deployer(&self, transport: Arc<dyn Transport>, max_concurrency: usize) -> Deployer {
        let pipeline = DeployPipeline::new(
            transport,
            Arc::new(self.registry()),
            PipelineOptions::default(),
        );
        Deployer::new(pipeline, max_concurrency, fast_poll())
    }
}

// ================================== HEALTH ====================================== //

pub fn metrics(cpu: f32, mem_pct: u64, disk_pct: u64) -> HostMetrics {
    HostMetrics {
        cpu_percent: cpu,
        memory_used: mem_pct,
        memory_total: 100,
        disk_used: disk_pct,
        disk_total: 100,
        uptime_secs: 3600,
    }
}

#[derive(Default)]
pub struct MockHealthQuery {
    metrics: HashMap<String, HostMetrics>,
    failing: HashSet<String>,
    delay: Duration,
    queries: AtomicUsize,
}

impl MockHealthQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, address: &str, metrics: HostMetrics) -> Self {
        self.metrics.insert(address.to_string(), metrics);
        self
    }

    pub fn failing_on(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl homefleet::health::query::HealthQuery for MockHealthQuery {
    async fn query_metrics(&self, host: &HostDescriptor) -> Result<HostMetrics, FleetError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&host.address) {
            return Err(FleetError::HealthQueryError("host unreachable".to_string()));
        }
        Ok(self
            .metrics
            .get(&host.address)
            .cloned()
            .unwrap_or_else(|| metrics(10.0, 20, 30)))
    }

    async fn query_containers(
        &self,
        host: &HostDescriptor,
    ) -> Result<Vec<ContainerStatus>, FleetError> {
        if self.failing.contains(&host.address) {
            return Err(FleetError::HealthQueryError("host unreachable".to_string()));
        }
        Ok(vec![ContainerStatus {
            name: "dashy".to_string(),
            image: "lissy93/dashy".to_string(),
            state: "running".to_string(),
            status: "Up 2 hours".to_string(),
            cpu_percent: Some(0.5),
            mem_usage: Some("80MiB / 1GiB".to_string()),
        }])
    }
}
