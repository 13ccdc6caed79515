//! Run context and run-in-progress guard

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::fanout::channel::HostEmitter;
use crate::fanout::scheduler::{FanOut, RunHandle, TerminalValue};
use crate::models::event::PipelineEvent;
use crate::models::host::HostDescriptor;

/// What a run does to its hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Deployment,
    Health,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Deployment => write!(f, "deployment"),
            RunKind::Health => write!(f, "health"),
        }
    }
}

/// Admits at most one active run of a kind
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` if a run already holds it
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the lifetime of one run; releases the slot on drop
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Everything belonging to one run. Created at submission and dropped once
/// the results have been aggregated. Every worker holds a share of the
/// permit, so the run slot frees only after the context and the last worker
/// are both gone.
pub struct RunContext<T> {
    id: Uuid,
    kind: RunKind,
    hosts: Vec<HostDescriptor>,
    started_at: DateTime<Utc>,
    handle: RunHandle<T>,
    _permit: Arc<RunPermit>,
}

impl<T: TerminalValue> RunContext<T> {
    /// Capture `hosts` and start one worker per host
    pub fn create<F, Fut>(
        kind: RunKind,
        hosts: Vec<HostDescriptor>,
        permit: RunPermit,
        max_concurrency: usize,
        factory: F,
    ) -> Self
    where
        F: Fn(HostDescriptor, HostEmitter) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = Uuid::new_v4();
        info!("Starting {} run {} over {} host(s)", kind, id, hosts.len());
        let permit = Arc::new(permit);
        let shared = permit.clone();
        let handle = FanOut::start(&hosts, max_concurrency, move |host, events| {
            let permit = shared.clone();
            let pipeline = factory(host, events);
            async move {
                let _permit = permit;
                pipeline.await
            }
        });
        Self {
            id,
            kind,
            hosts,
            started_at: Utc::now(),
            handle,
            _permit: permit,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Host snapshot captured at submission
    pub fn hosts(&self) -> &[HostDescriptor] {
        &self.hosts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn handle_mut(&mut self) -> &mut RunHandle<T> {
        &mut self.handle
    }

    pub fn try_drain_events(&mut self) -> Vec<PipelineEvent> {
        self.handle.try_drain()
    }

    pub fn is_complete(&self) -> bool {
        self.handle.is_complete()
    }

    pub fn collect(&mut self) -> Option<Vec<T>> {
        self.handle.collect()
    }
}

impl<T> Drop for RunContext<T> {
    fn drop(&mut self) {
        debug!("Disposing {} run {}", self.kind, self.id);
    }
}
