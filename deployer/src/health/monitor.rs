//! Health monitor: refresh runs, auto-refresh timer, snapshot cache, export

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::FleetError;
use crate::fanout::context::{RunContext, RunKind, RunSlot};
use crate::fanout::poller;
use crate::fanout::sink::EventLog;
use crate::health::cache::SnapshotCache;
use crate::health::pipeline::HealthPipeline;
use crate::models::health::HealthSnapshot;
use crate::models::host::{HostDescriptor, HostId};
use crate::validation::validate_hosts_access;
use crate::workers::refresh::{self, RefreshInterval};

/// Where each refresh gets its hosts from
pub type HostSource = Arc<dyn Fn() -> Vec<HostDescriptor> + Send + Sync>;

/// What a refresh request did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Started { run_id: Uuid },
    /// A refresh was already running; nothing was started
    InFlight,
}

impl RefreshOutcome {
    pub fn started(&self) -> bool {
        matches!(self, RefreshOutcome::Started { .. })
    }
}

struct AutoRefresh {
    interval: RefreshInterval,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    pipeline: HealthPipeline,
    hosts: HostSource,
    slot: RunSlot,
    max_concurrency: usize,
    poll_options: poller::Options,
    cache: SnapshotCache,
    events: EventLog,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    auto_refresh: Mutex<Option<AutoRefresh>>,
}

#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<Inner>,
}

impl HealthMonitor {
    pub fn new(
        pipeline: HealthPipeline,
        hosts: HostSource,
        max_concurrency: usize,
        poll_options: poller::Options,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                hosts,
                slot: RunSlot::new(),
                max_concurrency,
                poll_options,
                cache: SnapshotCache::new(),
                events: EventLog::new(),
                in_flight: Mutex::new(None),
                auto_refresh: Mutex::new(None),
            }),
        }
    }

    /// Start a refresh over every host unless one is already running. Nothing
    /// is queried if any host fails the access checks.
    pub fn refresh(&self) -> Result<RefreshOutcome, FleetError> {
        let hosts = (self.inner.hosts)();
        validate_hosts_access(&hosts).map_err(FleetError::ValidationFailed)?;

        let Some(permit) = self.inner.slot.try_acquire() else {
            debug!("Health refresh already in flight, ignoring request");
            return Ok(RefreshOutcome::InFlight);
        };

        let host_ids: Vec<HostId> = hosts.iter().map(|h| h.id).collect();
        let pipeline = self.inner.pipeline.clone();
        let mut context = RunContext::create(
            RunKind::Health,
            hosts,
            permit,
            self.inner.max_concurrency,
            move |host, events| {
                let pipeline = pipeline.clone();
                async move { pipeline.run(host, events).await }
            },
        );
        let run_id = context.id();

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let mut sink = inner.events.clone();
            let snapshots = poller::run_until_complete(
                &inner.poll_options,
                context.handle_mut(),
                &mut sink,
                tokio::time::sleep,
            )
            .await;
            inner.cache.retain(&host_ids);
            inner.cache.replace_all(snapshots);
            info!("Health run {} finished for {} host(s)", run_id, host_ids.len());
            // frees the slot
            drop(context);
        });
        *self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        Ok(RefreshOutcome::Started { run_id })
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.slot.is_busy()
    }

    /// Wait for the in-flight refresh, if any, to land in the cache
    pub async fn wait_for_refresh(&self) {
        let task = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Health run task failed: {}", e);
            }
        }
    }

    /// Refresh on a timer. Replaces any existing timer.
    pub fn enable_auto_refresh(&self, interval: RefreshInterval) {
        self.disable_auto_refresh();

        let (stop, stopped) = oneshot::channel::<()>();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let options = refresh::Options { interval };
        let task = tokio::spawn(async move {
            refresh::run(
                &options,
                move || match weak.upgrade() {
                    Some(inner) => {
                        if let Err(e) = (HealthMonitor { inner }).refresh() {
                            warn!("Scheduled health refresh skipped: {}", e);
                        }
                        true
                    }
                    None => false,
                },
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = stopped.await;
                }),
            )
            .await;
        });

        info!("Auto-refresh enabled every {}", interval);
        *self.inner.auto_refresh.lock().unwrap_or_else(|e| e.into_inner()) = Some(AutoRefresh {
            interval,
            stop,
            task,
        });
    }

    /// Stop the timer. A refresh already in flight still completes.
    pub fn disable_auto_refresh(&self) -> bool {
        let current = self
            .inner
            .auto_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match current {
            Some(auto) => {
                let _ = auto.stop.send(());
                info!("Auto-refresh disabled");
                true
            }
            None => false,
        }
    }

    pub fn auto_refresh_interval(&self) -> Option<RefreshInterval> {
        self.inner
            .auto_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|auto| auto.interval)
    }

    /// Cached snapshots ordered by host id
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        self.inner.cache.all()
    }

    pub fn snapshot(&self, host_id: HostId) -> Option<HealthSnapshot> {
        self.inner.cache.get(host_id)
    }

    /// Cached snapshots as a plain-text report; never queries hosts
    pub fn export_text(&self) -> String {
        self.snapshots()
            .iter()
            .map(HealthSnapshot::to_report_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Progress of health runs, for the API and CLI
    pub fn events(&self) -> EventLog {
        self.inner.events.clone()
    }

    /// Stop all timers and let the in-flight refresh finish
    pub async fn shutdown(&self) {
        let timer = self
            .inner
            .auto_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(auto) = timer {
            let _ = auto.stop.send(());
            if let Err(e) = auto.task.await {
                warn!("Auto-refresh task failed: {}", e);
            }
        }
        self.wait_for_refresh().await;
        debug!("Health monitor shut down");
    }
}
