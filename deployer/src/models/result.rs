//! Terminal pipeline results

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::host::{HostDescriptor, HostId, Service};

/// Why a host's pipeline ended unsuccessfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionFailed,
    UnknownOs,
    RuntimeInstallFailed,
    CompatLayerInstallFailed,
    RebootRequired,
    CompatRuntimeFailed,
    UnknownService,
    ServiceInstallFailed,
    WorkerLost,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "connection failed",
            ErrorKind::UnknownOs => "unknown OS",
            ErrorKind::RuntimeInstallFailed => "runtime installation failed",
            ErrorKind::CompatLayerInstallFailed => "compat layer install failed",
            ErrorKind::RebootRequired => "reboot required",
            ErrorKind::CompatRuntimeFailed => "runtime in compat layer failed",
            ErrorKind::UnknownService => "unknown service",
            ErrorKind::ServiceInstallFailed => "service installation failed",
            ErrorKind::WorkerLost => "worker lost",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "connection failed" => ErrorKind::ConnectionFailed,
            "unknown OS" => ErrorKind::UnknownOs,
            "runtime installation failed" => ErrorKind::RuntimeInstallFailed,
            "compat layer install failed" => ErrorKind::CompatLayerInstallFailed,
            "reboot required" => ErrorKind::RebootRequired,
            "runtime in compat layer failed" => ErrorKind::CompatRuntimeFailed,
            "unknown service" => ErrorKind::UnknownService,
            "service installation failed" => ErrorKind::ServiceInstallFailed,
            "worker lost" => ErrorKind::WorkerLost,
            _ => return Err(format!("Invalid error kind: {}", s)),
        };
        Ok(kind)
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Exactly one of these is produced per host per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub host_id: HostId,
    pub address: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl PipelineResult {
    pub fn succeeded(host: &HostDescriptor, service: Service) -> Self {
        Self {
            host_id: host.id,
            address: host.address.clone(),
            success: true,
            service: Some(service),
            error_kind: None,
        }
    }

    pub fn failed(host: &HostDescriptor, kind: ErrorKind) -> Self {
        Self {
            host_id: host.id,
            address: host.address.clone(),
            success: false,
            service: None,
            error_kind: Some(kind),
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }
}
