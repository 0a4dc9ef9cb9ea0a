//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::models::NewServerInstance;
use crate::server::state::ServerState;
use crate::utils::version_info;

type HandlerResult<T> = Result<T, ManagerError>;

// =============================== SERVICE ================================== //

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gsmgr".to_string(),
        version: version.version,
    })
}

pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// =============================== USERS ================================== //

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

pub async fn list_users_handler(
    State(state): State<Arc<ServerState>>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.users.list().await?))
}

pub async fn create_user_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateUserRequest>,
) -> HandlerResult<impl IntoResponse> {
    let user = state.users.create(request.username).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// =============================== INSTANCES ================================== //

pub async fn list_instances_handler(
    State(state): State<Arc<ServerState>>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.list().await?))
}

pub async fn create_instance_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<NewServerInstance>,
) -> HandlerResult<impl IntoResponse> {
    let instance = state.instances.create(request).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn get_instance_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.get(id).await?))
}

pub async fn delete_instance_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    state.instances.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RamRequest {
    pub allocated_ram_mb: u32,
}

pub async fn set_ram_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RamRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .instances
            .set_allocated_ram(id, request.allocated_ram_mb)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PortRequest {
    pub port: u16,
}

pub async fn set_port_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<PortRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.set_port(id, request.port).await?))
}

// =============================== PROVISIONING ================================== //

#[derive(Debug, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub job_id: Uuid,
}

pub async fn provision_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let job_id = state.instances.start_provisioning(id).await?;
    Ok((StatusCode::ACCEPTED, Json(ProvisionResponse { job_id })))
}

pub async fn job_handler(
    State(state): State<Arc<ServerState>>,
    Path(job_id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.job(job_id)?))
}

// =============================== LIFECYCLE ================================== //

pub async fn start_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    state.instances.start(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    state.instances.stop(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.status(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response: String,
}

pub async fn command_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CommandRequest>,
) -> HandlerResult<impl IntoResponse> {
    let response = state.instances.command(id, &request.command).await?;
    Ok(Json(CommandResponse { response }))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub from_line: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogResponse {
    pub lines: Vec<String>,
}

pub async fn log_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> HandlerResult<impl IntoResponse> {
    let lines = state.instances.log(id, query.from_line).await?;
    Ok(Json(LogResponse { lines }))
}

pub async fn clean_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    state.instances.clean(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================== PROPERTIES ================================== //

pub async fn list_properties_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.instances.properties(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EditPropertyRequest {
    pub value: String,
}

pub async fn edit_property_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, property_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<EditPropertyRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(
        state
            .instances
            .edit_property(id, property_id, request.value)
            .await?,
    ))
}

pub async fn write_properties_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    state.instances.write_properties(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================== BACKUPS ================================== //

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub actor_id: Uuid,
}

pub async fn list_backups_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.backups.list(id).await?))
}

pub async fn create_backup_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateBackupRequest>,
) -> HandlerResult<impl IntoResponse> {
    let backup = state.backups.create(id, request.actor_id).await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

pub async fn latest_backup_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.backups.latest(id).await?))
}

pub async fn restore_backup_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, backup_id)): Path<(Uuid, Uuid)>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.backups.restore(id, backup_id).await?))
}
