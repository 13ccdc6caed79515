//! Per-host deployment pipeline
//!
//! Drives one host from connectivity test to service installation through the
//! [`StageFsm`], emitting a progress event before each stage and after every
//! non-terminal outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::deploy::fsm::{Stage, StageEvent, StageFsm};
use crate::fanout::channel::HostEmitter;
use crate::fanout::scheduler::TerminalValue;
use crate::installers::registry::InstallerRegistry;
use crate::installers::{CompatDecision, InstallOutcome, InstallTarget, Installer};
use crate::models::host::{HostDescriptor, OsFamily, Service};
use crate::models::result::{ErrorKind, PipelineResult};
use crate::remote::Transport;

impl TerminalValue for PipelineResult {
    fn worker_lost(host: &HostDescriptor, _reason: &str) -> Self {
        PipelineResult::failed(host, ErrorKind::WorkerLost)
    }
}

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound for any single stage
    pub stage_timeout: Duration,

    /// Domain services are published under when the proxy is up
    pub domain: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(900),
            domain: None,
        }
    }
}

/// Everything a host pipeline needs; cheap to clone into each worker
#[derive(Clone)]
pub struct DeployPipeline {
    transport: Arc<dyn Transport>,
    registry: Arc<InstallerRegistry>,
    options: PipelineOptions,
}

/// One host's walk through the stages
struct Walk<'a> {
    host: &'a HostDescriptor,
    events: &'a HostEmitter,
    fsm: StageFsm,
    service: Option<Service>,
}

impl Walk<'_> {
    fn advance(&mut self, event: StageEvent) -> Stage {
        match self.fsm.process(event) {
            Ok(stage) => stage,
            Err(e) => {
                error!("{} pipeline: {}", self.host.label(), e);
                self.fsm.stage()
            }
        }
    }

    /// Hard failure: final error event, then the terminal result
    fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> PipelineResult {
        self.advance(StageEvent::Fail(kind));
        self.events.error(message);
        let result = PipelineResult::failed(self.host, kind);
        match self.service {
            Some(service) => result.with_service(service),
            None => result,
        }
    }
}

impl DeployPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<InstallerRegistry>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            transport,
            registry,
            options,
        }
    }

    async fn bounded<T, F>(&self, what: &str, host: &HostDescriptor, fut: F, on_timeout: T) -> T
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout(self.options.stage_timeout, fut).await {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "{} timed out on {} after {:?}",
                    what,
                    host.label(),
                    self.options.stage_timeout
                );
                on_timeout
            }
        }
    }

    async fn install(&self, installer: &dyn Installer, target: &InstallTarget<'_>) -> InstallOutcome {
        let name = installer.name().to_string();
        self.bounded(
            &name,
            target.host,
            installer.install(target),
            InstallOutcome::Legacy(false),
        )
        .await
    }

    /// Run the pipeline for `host`. Always yields exactly one result.
    pub async fn run(&self, host: HostDescriptor, events: HostEmitter) -> PipelineResult {
        let mut walk = Walk {
            host: &host,
            events: &events,
            fsm: StageFsm::new(),
            service: None,
        };
        walk.advance(StageEvent::Start);

        // Connect
        events.info("Testing connection");
        let reachable = self
            .bounded("Connection test", &host, self.transport.test_reachable(&host), false)
            .await;
        if !reachable {
            return walk.fail(ErrorKind::ConnectionFailed, "Connection failed");
        }
        walk.advance(StageEvent::Connected);
        events.success("Connected");

        // Detect OS
        events.info("Detecting operating system");
        let os = self
            .bounded("OS detection", &host, self.transport.detect_os(&host), OsFamily::Unknown)
            .await;
        if walk.advance(StageEvent::OsDetected(os)) == Stage::Failed(ErrorKind::UnknownOs) {
            events.error("Unknown operating system");
            return PipelineResult::failed(&host, ErrorKind::UnknownOs);
        }
        events.success(format!("Detected {}", os));

        let platform = match self.registry.platform(os) {
            Some(platform) => platform,
            None => {
                // the FSM is already past OS detection, so fail outside it
                events.error(format!("No installers for {}", os));
                return PipelineResult::failed(&host, ErrorKind::UnknownOs);
            }
        };

        let mut target = InstallTarget {
            host: &host,
            os,
            service: host.service,
            domain: self.options.domain.as_deref(),
            proxy_available: false,
        };

        // Compatibility layer
        if walk.fsm.stage() == Stage::CompatLayer {
            match platform.compat_layer.as_deref() {
                Some(compat) => {
                    events.info(format!("Installing {}", compat.name()));
                    match self.install(compat, &target).await.decision() {
                        CompatDecision::Proceed => {
                            events.success(format!("{} ready", compat.name()));
                        }
                        CompatDecision::Failed => {
                            return walk.fail(
                                ErrorKind::CompatLayerInstallFailed,
                                format!("{} install failed", compat.name()),
                            );
                        }
                        CompatDecision::RebootRequired => {
                            return walk.fail(
                                ErrorKind::RebootRequired,
                                format!("{} installed, reboot required", compat.name()),
                            );
                        }
                    }
                }
                None => info!("No compatibility layer registered for {}", os),
            }
            walk.advance(StageEvent::CompatReady);
        }

        // Runtime
        let runtime = platform.runtime.as_ref();
        events.info(format!("Installing {}", runtime.name()));
        if !self.install(runtime, &target).await.succeeded() {
            let kind = walk.fsm.runtime_failure();
            return walk.fail(kind, format!("{} install failed", runtime.name()));
        }
        walk.advance(StageEvent::RuntimeReady);
        events.success(format!("{} ready", runtime.name()));

        // Reverse proxy (soft)
        let proxy = platform.reverse_proxy.as_ref();
        events.info(format!("Installing {}", proxy.name()));
        let proxy_up = self.install(proxy, &target).await.succeeded();
        walk.advance(StageEvent::ProxyDone(proxy_up));
        if proxy_up {
            events.success(format!("{} ready", proxy.name()));
        } else {
            events.warning(format!(
                "{} unavailable, service will be reachable on its direct port",
                proxy.name()
            ));
        }
        target.proxy_available = walk.fsm.proxy_available();

        // Service
        walk.service = host.service;
        let installer = match host.service {
            Some(service) => self.registry.service(service),
            None => None,
        };
        let (service, installer) = match (host.service, installer) {
            (Some(service), Some(installer)) => (service, installer),
            _ => return walk.fail(ErrorKind::UnknownService, "Unknown service"),
        };

        events.info(format!("Installing {}", service));
        if !self.install(installer.as_ref(), &target).await.succeeded() {
            return walk.fail(
                ErrorKind::ServiceInstallFailed,
                format!("{} install failed", service),
            );
        }
        walk.advance(StageEvent::ServiceInstalled);
        events.success(format!("{} installed", service));
        info!("Deployed {} to {}", service, host.label());

        PipelineResult::succeeded(&host, service)
    }
}
