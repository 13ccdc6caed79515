//! Progress channel
//!
//! Unbounded multi-producer, single-consumer queue of [`PipelineEvent`]s.
//! Every worker holds a [`HostEmitter`] tagged with its host id; the
//! completion poller owns the only [`ProgressReceiver`]. Sending never blocks
//! and events from one emitter arrive in the order they were sent.

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::event::{PipelineEvent, Severity};
use crate::models::host::HostId;

/// Create a connected sender/receiver pair
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Producer side, cloned into every worker
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ProgressSender {
    /// Emitter that tags every event with `host_id`
    pub fn for_host(&self, host_id: HostId) -> HostEmitter {
        HostEmitter {
            host_id,
            tx: self.tx.clone(),
        }
    }
}

/// Per-host producer handed to one pipeline
#[derive(Debug, Clone)]
pub struct HostEmitter {
    host_id: HostId,
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl HostEmitter {
    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    /// Queue one event. Silently dropped if the run was already torn down.
    pub fn emit(&self, severity: Severity, message: impl Into<String>) {
        let event = PipelineEvent::new(self.host_id, severity, message);
        debug!(host_id = self.host_id, severity = severity.as_str(), "{}", event.message);
        let _ = self.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, message);
    }
}

/// Consumer side, owned by the run handle
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl ProgressReceiver {
    /// Pop every event currently queued, without waiting
    pub fn try_drain(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
