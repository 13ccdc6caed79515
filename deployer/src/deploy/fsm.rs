//! Finite state machine for one host's deployment pipeline

use serde::{Deserialize, Serialize};

use crate::models::host::OsFamily;
use crate::models::result::ErrorKind;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not started
    Pending,

    /// Testing reachability
    Connecting,

    /// Classifying the operating system
    DetectingOs,

    /// Installing the compatibility layer (Windows only)
    CompatLayer,

    /// Installing the container runtime
    Runtime,

    /// Installing the reverse proxy (soft stage)
    ReverseProxy,

    /// Installing the selected service
    Service,

    /// Terminal: service installed
    Succeeded,

    /// Terminal: stopped on a hard failure
    Failed(ErrorKind),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed(_))
    }
}

/// Stage event
#[derive(Debug, Clone, Copy)]
pub enum StageEvent {
    Start,
    Connected,
    OsDetected(OsFamily),
    CompatReady,
    RuntimeReady,
    /// Proxy stage finished; `true` when the proxy is up
    ProxyDone(bool),
    ServiceInstalled,
    Fail(ErrorKind),
}

/// Stage FSM
#[derive(Debug, Clone)]
pub struct StageFsm {
    stage: Stage,
    os: Option<OsFamily>,
    proxy_available: bool,
}

impl StageFsm {
    pub fn new() -> Self {
        Self {
            stage: Stage::Pending,
            os: None,
            proxy_available: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn os(&self) -> Option<OsFamily> {
        self.os
    }

    pub fn proxy_available(&self) -> bool {
        self.proxy_available
    }

    /// Failure kind for the runtime stage on the detected OS
    pub fn runtime_failure(&self) -> ErrorKind {
        match self.os {
            Some(OsFamily::Windows) => ErrorKind::CompatRuntimeFailed,
            _ => ErrorKind::RuntimeInstallFailed,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StageEvent) -> Result<Stage, String> {
        use ErrorKind::*;

        let new_stage = match (self.stage, event) {
            (Stage::Pending, StageEvent::Start) => Stage::Connecting,

            (Stage::Connecting, StageEvent::Connected) => Stage::DetectingOs,
            (Stage::Connecting, StageEvent::Fail(ConnectionFailed)) => {
                Stage::Failed(ConnectionFailed)
            }

            (Stage::DetectingOs, StageEvent::OsDetected(OsFamily::Linux)) => {
                self.os = Some(OsFamily::Linux);
                Stage::Runtime
            }
            (Stage::DetectingOs, StageEvent::OsDetected(OsFamily::Windows)) => {
                self.os = Some(OsFamily::Windows);
                Stage::CompatLayer
            }
            (Stage::DetectingOs, StageEvent::OsDetected(OsFamily::Unknown))
            | (Stage::DetectingOs, StageEvent::Fail(UnknownOs)) => {
                self.os = Some(OsFamily::Unknown);
                Stage::Failed(UnknownOs)
            }

            (Stage::CompatLayer, StageEvent::CompatReady) => Stage::Runtime,
            (Stage::CompatLayer, StageEvent::Fail(kind @ (CompatLayerInstallFailed | RebootRequired))) => {
                Stage::Failed(kind)
            }

            (Stage::Runtime, StageEvent::RuntimeReady) => Stage::ReverseProxy,
            (Stage::Runtime, StageEvent::Fail(kind)) if kind == self.runtime_failure() => {
                Stage::Failed(kind)
            }

            // Proxy failure is soft: the service still gets installed.
            (Stage::ReverseProxy, StageEvent::ProxyDone(up)) => {
                self.proxy_available = up;
                Stage::Service
            }

            (Stage::Service, StageEvent::ServiceInstalled) => Stage::Succeeded,
            (Stage::Service, StageEvent::Fail(kind @ (UnknownService | ServiceInstallFailed))) => {
                Stage::Failed(kind)
            }

            (stage, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", stage, event));
            }
        };

        self.stage = new_stage;
        Ok(new_stage)
    }
}

impl Default for StageFsm {
    fn default() -> Self {
        Self::new()
    }
}
