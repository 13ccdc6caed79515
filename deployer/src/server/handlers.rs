//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::app::state::DeploymentStatus;
use crate::errors::FleetError;
use crate::health::monitor::RefreshOutcome;
use crate::models::health::HealthSnapshot;
use crate::models::host::{HostDescriptor, HostId, Service};
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::validation::ValidationIssue;
use crate::workers::refresh::RefreshInterval;

/// Error body returned by every failing route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

/// [`FleetError`] mapped onto a status code
pub struct ApiError(pub FleetError);

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FleetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FleetError::RunInProgress(_) => StatusCode::CONFLICT,
            FleetError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }
        let issues = match &self.0 {
            FleetError::ValidationFailed(issues) => issues.clone(),
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            issues,
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "homefleet".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================== HOSTS ======================================= //

/// A host as the API shows it; the secret never leaves the process
#[derive(Debug, Serialize, Deserialize)]
pub struct HostView {
    pub id: HostId,
    pub address: String,
    pub user: String,
    pub has_secret: bool,
    pub service: Option<Service>,
}

impl From<&HostDescriptor> for HostView {
    fn from(host: &HostDescriptor) -> Self {
        Self {
            id: host.id,
            address: host.address.clone(),
            user: host.user.clone(),
            has_secret: host.has_secret(),
            service: host.service,
        }
    }
}

pub async fn list_hosts_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let hosts: Vec<HostView> = state.app.hosts.snapshot().iter().map(HostView::from).collect();
    Json(hosts)
}

#[derive(Debug, Deserialize)]
pub struct AddHostRequest {
    pub address: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub service: Option<String>,
}

pub async fn add_host_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AddHostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = request.service.as_deref().map(Service::parse);
    let host = state
        .app
        .hosts
        .add(request.address, request.user, request.secret, service)?;
    state.app.save_hosts().await?;
    Ok((StatusCode::CREATED, Json(HostView::from(&host))))
}

pub async fn remove_host_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<HostId>,
) -> Result<impl IntoResponse, ApiError> {
    state.app.hosts.remove(id)?;
    state.app.save_hosts().await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================== DEPLOYMENTS ==================================== //

#[derive(Debug, Default, Deserialize)]
pub struct DeployRequest {
    /// Hosts to deploy; every host when absent or empty
    #[serde(default)]
    pub ids: Vec<HostId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub run_id: Uuid,
}

pub async fn start_deployment_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // an empty body deploys every host
    let request: DeployRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DeployRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| FleetError::InvalidInput(format!("Invalid deploy request: {}", e)))?
    };
    let run_id = state.app.start_deployment(&request.ids)?;
    info!("Deployment {} started from the API", run_id);
    Ok((StatusCode::ACCEPTED, Json(DeployResponse { run_id })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CursorQuery {
    #[serde(default)]
    pub cursor: usize,
}

pub async fn current_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<DeploymentStatus>, ApiError> {
    state
        .app
        .deployments
        .status(query.cursor)
        .map(Json)
        .ok_or_else(|| ApiError(FleetError::NotFound("no deployment has run".to_string())))
}

// ================================= HEALTH ======================================= //

pub async fn snapshots_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<HealthSnapshot>> {
    Json(state.app.health.snapshots())
}

pub async fn snapshot_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<HostId>,
) -> Result<Json<HealthSnapshot>, ApiError> {
    state
        .app
        .health
        .snapshot(id)
        .map(Json)
        .ok_or_else(|| ApiError(FleetError::NotFound(format!("snapshot for host #{}", id))))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// False when a refresh was already running
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

pub async fn refresh_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (status, run_id) = match state.app.health.refresh()? {
        RefreshOutcome::Started { run_id } => (StatusCode::ACCEPTED, Some(run_id)),
        RefreshOutcome::InFlight => (StatusCode::OK, None),
    };
    let started = run_id.is_some();
    Ok((status, Json(RefreshResponse { started, run_id })))
}

pub async fn export_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.app.health.export_text(),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoRefreshBody {
    pub interval: Option<RefreshInterval>,
}

pub async fn get_auto_refresh_handler(State(state): State<Arc<ServerState>>) -> Json<AutoRefreshBody> {
    Json(AutoRefreshBody {
        interval: state.app.health.auto_refresh_interval(),
    })
}

pub async fn set_auto_refresh_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<AutoRefreshBody>,
) -> Json<AutoRefreshBody> {
    match body.interval {
        Some(interval) => state.app.health.enable_auto_refresh(interval),
        None => {
            state.app.health.disable_auto_refresh();
        }
    }
    Json(AutoRefreshBody {
        interval: state.app.health.auto_refresh_interval(),
    })
}

pub async fn disable_auto_refresh_handler(State(state): State<Arc<ServerState>>) -> StatusCode {
    state.app.health.disable_auto_refresh();
    StatusCode::NO_CONTENT
}
