//! Fan-out scheduler
//!
//! Spawns one worker per host as soon as [`FanOut::start`] is called. Each
//! worker runs the pipeline future built by the caller's factory and parks its
//! terminal value in a per-worker slot. The returned [`RunHandle`] never
//! blocks: it can drain progress, report whether every worker has finished,
//! and hand out the terminal values once they have.
//!
//! ```text
//!   hosts[0]  hosts[1]  ...  hosts[N-1]
//!      │         │              │
//!      └─ factory(host, emitter) ─► tokio::spawn(permit → pipeline → slot)
//!                                          │
//!   emitter ── PipelineEvent ──► ProgressReceiver ──► RunHandle::try_drain()
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::fanout::channel::{progress_channel, HostEmitter, ProgressReceiver};
use crate::models::event::PipelineEvent;
use crate::models::host::HostDescriptor;

/// Hard ceiling on concurrent workers, whatever the configuration says
pub const MAX_WORKERS: usize = 256;

/// A value a worker produces exactly once when its pipeline ends
pub trait TerminalValue: Send + 'static {
    /// Stand-in result for a worker that could not start or did not finish
    fn worker_lost(host: &HostDescriptor, reason: &str) -> Self;
}

/// Effective pool size for `host_count` hosts under a configured cap
pub fn pool_size(host_count: usize, cap: usize) -> usize {
    host_count.max(1).min(cap.clamp(1, MAX_WORKERS))
}

/// Entry point of the scheduler
pub struct FanOut;

impl FanOut {
    /// Start one worker per host. Workers begin executing immediately.
    pub fn start<T, F, Fut>(hosts: &[HostDescriptor], cap: usize, factory: F) -> RunHandle<T>
    where
        T: TerminalValue,
        F: Fn(HostDescriptor, HostEmitter) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (sender, receiver) = progress_channel();
        let permits = pool_size(hosts.len(), cap);
        let semaphore = Arc::new(Semaphore::new(permits));
        debug!("Starting {} workers with {} permits", hosts.len(), permits);

        let mut workers = Vec::with_capacity(hosts.len());
        for host in hosts {
            let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
            let emitter = sender.for_host(host.id);

            let spawned = panic::catch_unwind(AssertUnwindSafe(|| {
                let pipeline = factory(host.clone(), emitter);
                spawn_worker(host.clone(), pipeline, semaphore.clone(), slot.clone())
            }));

            let task = match spawned {
                Ok(task) => Some(task),
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!("Failed to start worker for {}: {}", host.label(), reason);
                    store(&slot, T::worker_lost(host, &reason));
                    None
                }
            };

            workers.push(Worker {
                host: host.clone(),
                slot,
                task,
            });
        }

        RunHandle {
            progress: receiver,
            workers,
            collected: false,
        }
    }
}

fn spawn_worker<T, Fut>(
    host: HostDescriptor,
    pipeline: Fut,
    semaphore: Arc<Semaphore>,
    slot: Arc<Mutex<Option<T>>>,
) -> JoinHandle<()>
where
    T: TerminalValue,
    Fut: Future<Output = T> + Send + 'static,
{
    tokio::spawn(async move {
        // The semaphore is never closed, so acquire only fails if it is dropped.
        let _permit = semaphore.acquire_owned().await.ok();

        let value = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(value) => value,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!("Worker for {} panicked: {}", host.label(), reason);
                T::worker_lost(&host, &reason)
            }
        };
        store(&slot, value);
    })
}

fn store<T>(slot: &Mutex<Option<T>>, value: T) {
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(value);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

struct Worker<T> {
    host: HostDescriptor,
    slot: Arc<Mutex<Option<T>>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Worker<T> {
    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

/// Handle over one fan-out
pub struct RunHandle<T> {
    progress: ProgressReceiver,
    workers: Vec<Worker<T>>,
    collected: bool,
}

impl<T: TerminalValue> RunHandle<T> {
    /// Number of workers in this run
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Pop all currently queued progress events
    pub fn try_drain(&mut self) -> Vec<PipelineEvent> {
        self.progress.try_drain()
    }

    /// True once every worker has produced its terminal value
    pub fn is_complete(&self) -> bool {
        self.workers.iter().all(Worker::is_finished)
    }

    /// Terminal values in submission order, or `None` while workers are still
    /// running or if the values were already handed out.
    pub fn collect(&mut self) -> Option<Vec<T>> {
        if self.collected || !self.is_complete() {
            return None;
        }
        self.collected = true;

        let results = self
            .workers
            .drain(..)
            .map(|worker| {
                let value = worker
                    .slot
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();
                value.unwrap_or_else(|| {
                    warn!("Worker for {} exited without a result", worker.host.label());
                    T::worker_lost(&worker.host, "worker exited without a result")
                })
            })
            .collect();
        Some(results)
    }
}
