//! Progress event models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::host::HostId;

/// Severity of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A human-readable progress message from one host's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub host_id: HostId,
    pub message: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(host_id: HostId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            host_id,
            message: message.into(),
            severity,
            at: Utc::now(),
        }
    }
}
