//! Application state management

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::options::AppOptions;
use crate::deploy::aggregate::Summary;
use crate::deploy::orchestrator::Deployer;
use crate::deploy::pipeline::DeployPipeline;
use crate::errors::FleetError;
use crate::fanout::sink::EventLog;
use crate::health::local::LocalHealthQuery;
use crate::health::monitor::{HealthMonitor, HostSource};
use crate::health::pipeline::HealthPipeline;
use crate::health::query::{HealthQuery, ShellHealthQuery};
use crate::installers::registry::InstallerRegistry;
use crate::models::event::PipelineEvent;
use crate::models::host::{HostDescriptor, HostId};
use crate::remote::ssh::SshTransport;
use crate::remote::Transport;
use crate::storage::inventory::HostStore;

/// Progress of the current (or last) deployment, as seen by the API
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub hosts: Vec<HostId>,
    pub complete: bool,
    pub events: Vec<PipelineEvent>,
    pub next_cursor: usize,
    pub summary: Option<Summary>,
}

struct CurrentDeployment {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    hosts: Vec<HostId>,
    events: EventLog,
    summary: Arc<Mutex<Option<Summary>>>,
    task: Option<JoinHandle<()>>,
}

/// Runs deployments in the background for callers that poll
pub struct DeploymentService {
    deployer: Deployer,
    current: Mutex<Option<CurrentDeployment>>,
}

impl DeploymentService {
    pub fn new(deployer: Deployer) -> Self {
        Self {
            deployer,
            current: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.deployer.is_busy()
    }

    /// The underlying deployer, for callers that drive a run themselves
    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Submit `hosts` and drive the run on a background task
    pub fn start(&self, hosts: Vec<HostDescriptor>) -> Result<Uuid, FleetError> {
        let mut run = self.deployer.submit(hosts)?;
        let run_id = run.id();
        let started_at = run.started_at();
        let host_ids = run.hosts().iter().map(|h| h.id).collect();
        let events = EventLog::new();
        let summary = Arc::new(Mutex::new(None));

        let mut sink = events.clone();
        let landed = summary.clone();
        let task = tokio::spawn(async move {
            let result = run.wait(&mut sink).await;
            *landed.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        });

        let current = CurrentDeployment {
            run_id,
            started_at,
            hosts: host_ids,
            events,
            summary,
            task: Some(task),
        };
        let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(current);
        Ok(run_id)
    }

    /// Status of the latest deployment with the events from `cursor` on
    pub fn status(&self, cursor: usize) -> Option<DeploymentStatus> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let current = current.as_ref()?;
        let (events, next_cursor) = current.events.since(cursor);
        let summary = current
            .summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Some(DeploymentStatus {
            run_id: current.run_id,
            started_at: current.started_at,
            hosts: current.hosts.clone(),
            complete: summary.is_some(),
            events,
            next_cursor,
            summary,
        })
    }

    /// Wait for the background run, if any, to produce its summary
    pub async fn wait(&self) -> Option<Summary> {
        let (task, summary) = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            let current = current.as_mut()?;
            (current.task.take(), current.summary.clone())
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Deployment task failed: {}", e);
            }
        }
        let summary = summary.lock().unwrap_or_else(|e| e.into_inner()).clone();
        summary
    }
}

/// Main application state
pub struct AppState {
    pub options: AppOptions,

    /// Host inventory
    pub hosts: HostStore,

    /// Background deployments
    pub deployments: DeploymentService,

    /// Health snapshots and refresh runs
    pub health: HealthMonitor,
}

impl AppState {
    /// Wire the state from explicit seams
    pub fn new(
        options: AppOptions,
        hosts: HostStore,
        transport: Arc<dyn Transport>,
        registry: InstallerRegistry,
        remote_query: Arc<dyn HealthQuery>,
        local_query: Arc<dyn HealthQuery>,
    ) -> Self {
        let pipeline = DeployPipeline::new(transport, Arc::new(registry), options.pipeline.clone());
        let deployer = Deployer::new(pipeline, options.max_concurrency, options.poller.clone());

        let health_pipeline = HealthPipeline::new(remote_query, local_query, options.thresholds);
        let store = hosts.clone();
        let source: HostSource = Arc::new(move || store.snapshot());
        let health = HealthMonitor::new(
            health_pipeline,
            source,
            options.max_concurrency,
            options.poller.clone(),
        );

        Self {
            options,
            hosts,
            deployments: DeploymentService::new(deployer),
            health,
        }
    }

    /// Load the inventory and wire the SSH-backed production seams
    pub async fn init(options: AppOptions) -> Result<Self, FleetError> {
        options.layout.setup().await?;
        let hosts = HostStore::load(&options.layout.hosts_file()).await?;
        info!("Loaded {} host(s)", hosts.len());

        let transport: Arc<dyn Transport> = Arc::new(SshTransport::new(options.ssh.clone()));
        let registry = InstallerRegistry::standard(transport.clone(), options.reboot.clone());
        let remote_query: Arc<dyn HealthQuery> = Arc::new(ShellHealthQuery::new(transport.clone()));
        let local_query: Arc<dyn HealthQuery> = Arc::new(LocalHealthQuery);

        Ok(Self::new(
            options,
            hosts,
            transport,
            registry,
            remote_query,
            local_query,
        ))
    }

    /// The hosts named by `ids`, or every host when `ids` is empty
    pub fn select_hosts(&self, ids: &[HostId]) -> Result<Vec<HostDescriptor>, FleetError> {
        let hosts = if ids.is_empty() {
            self.hosts.snapshot()
        } else {
            self.hosts.select(ids)?
        };
        if hosts.is_empty() {
            return Err(FleetError::InvalidInput("No hosts to deploy".to_string()));
        }
        Ok(hosts)
    }

    /// Start a background deployment of [`AppState::select_hosts`]
    pub fn start_deployment(&self, ids: &[HostId]) -> Result<Uuid, FleetError> {
        let hosts = self.select_hosts(ids)?;
        self.deployments.start(hosts)
    }

    pub async fn save_hosts(&self) -> Result<(), FleetError> {
        self.hosts.save(&self.options.layout.hosts_file()).await
    }

    /// Stop timers and let in-flight runs finish
    pub async fn shutdown(&self) -> Result<(), FleetError> {
        self.health.shutdown().await;
        self.deployments.wait().await;
        self.save_hosts().await
    }
}
