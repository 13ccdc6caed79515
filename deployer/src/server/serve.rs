//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::FleetError;
use crate::server::handlers::{
    add_host_handler, current_deployment_handler, disable_auto_refresh_handler, export_handler,
    get_auto_refresh_handler, health_handler, list_hosts_handler, refresh_handler,
    remove_host_handler, set_auto_refresh_handler, snapshot_handler, snapshots_handler,
    start_deployment_handler, version_handler,
};
use crate::server::state::ServerState;

/// Routes of the local control API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Inventory
        .route("/hosts", get(list_hosts_handler).post(add_host_handler))
        .route("/hosts/{id}", delete(remove_host_handler))
        // Deployments
        .route("/deployments", post(start_deployment_handler))
        .route("/deployments/current", get(current_deployment_handler))
        // Health monitoring
        .route("/health/snapshots", get(snapshots_handler))
        .route("/health/snapshots/{id}", get(snapshot_handler))
        .route("/health/refresh", post(refresh_handler))
        .route("/health/export", get(export_handler))
        .route(
            "/health/auto-refresh",
            get(get_auto_refresh_handler)
                .put(set_auto_refresh_handler)
                .delete(disable_auto_refresh_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), FleetError>>, FleetError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| FleetError::ServerError(format!("{}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| FleetError::ServerError(e.to_string()))
    });

    Ok(handle)
}
