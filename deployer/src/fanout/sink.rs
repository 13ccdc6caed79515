//! Progress sinks: where drained events end up

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use colored::Colorize;

use crate::models::event::{PipelineEvent, Severity};
use crate::models::host::{HostDescriptor, HostId};

/// Consumer of drained progress events, called from the completion poller
pub trait ProgressSink: Send {
    fn on_event(&mut self, event: PipelineEvent);
}

impl ProgressSink for Vec<PipelineEvent> {
    fn on_event(&mut self, event: PipelineEvent) {
        self.push(event);
    }
}

/// Prints events to stdout, colored by severity
pub struct ConsoleSink {
    labels: HashMap<HostId, String>,
}

impl ConsoleSink {
    pub fn new(hosts: &[HostDescriptor]) -> Self {
        Self {
            labels: hosts.iter().map(|h| (h.id, h.label())).collect(),
        }
    }

    fn format(&self, event: &PipelineEvent) -> String {
        let label = self
            .labels
            .get(&event.host_id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", event.host_id));
        let prefix = format!("[{}]", label).bold();
        let message = match event.severity {
            Severity::Info => event.message.normal(),
            Severity::Success => event.message.green(),
            Severity::Warning => event.message.yellow(),
            Severity::Error => event.message.red(),
        };
        format!("{} {} {}", event.at.format("%H:%M:%S"), prefix, message)
    }
}

impl ProgressSink for ConsoleSink {
    fn on_event(&mut self, event: PipelineEvent) {
        println!("{}", self.format(&event));
    }
}

/// Shared, append-only event log read back by the HTTP API
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events starting at `cursor`, plus the cursor for the next read
    pub fn since(&self, cursor: usize) -> (Vec<PipelineEvent>, usize) {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let start = cursor.min(events.len());
        (events[start..].to_vec(), events.len())
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressSink for EventLog {
    fn on_event(&mut self, event: PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
