//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ManagerError;
use crate::server::handlers::*;
use crate::server::state::ServerState;

/// Routes of the local HTTP surface
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Users
        .route("/users", get(list_users_handler).post(create_user_handler))
        // Instances
        .route(
            "/instances",
            get(list_instances_handler).post(create_instance_handler),
        )
        .route(
            "/instances/{id}",
            get(get_instance_handler).delete(delete_instance_handler),
        )
        .route("/instances/{id}/ram", put(set_ram_handler))
        .route("/instances/{id}/port", put(set_port_handler))
        // Provisioning
        .route("/instances/{id}/provision", post(provision_handler))
        .route("/jobs/{job_id}", get(job_handler))
        // Lifecycle
        .route("/instances/{id}/start", post(start_handler))
        .route("/instances/{id}/stop", post(stop_handler))
        .route("/instances/{id}/status", get(status_handler))
        .route("/instances/{id}/command", post(command_handler))
        .route("/instances/{id}/log", get(log_handler))
        .route("/instances/{id}/clean", post(clean_handler))
        // Properties
        .route("/instances/{id}/properties", get(list_properties_handler))
        .route(
            "/instances/{id}/properties/write",
            post(write_properties_handler),
        )
        .route(
            "/instances/{id}/properties/{property_id}",
            put(edit_property_handler),
        )
        // Backups
        .route(
            "/instances/{id}/backups",
            get(list_backups_handler).post(create_backup_handler),
        )
        .route("/instances/{id}/backups/latest", get(latest_backup_handler))
        .route(
            "/instances/{id}/backups/{backup_id}/restore",
            post(restore_backup_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ManagerError>>, ManagerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ManagerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ManagerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
