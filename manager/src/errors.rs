//! Error types for the game server manager

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use thiserror::Error;

/// Broad classification of a [`ManagerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing directory/artifact, invalid configuration of the host
    Environment,
    /// A bounded wait expired
    Timeout,
    /// Remote console I/O failed
    Communication,
    /// A precondition on the instance state was violated
    State,
    /// Best-effort cleanup failed on top of another failure
    Cleanup,
    Other,
}

/// Main error type for the manager
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    // -- supervision --
    #[error("Server instance {0} is already running")]
    AlreadyRunning(String),

    #[error("Server instance {0} is not running")]
    NotRunning(String),

    #[error("Invalid instance environment: {0}")]
    EnvironmentInvalid(String),

    #[error("Failed to launch supervised session: {0}")]
    SupervisorLaunchFailed(String),

    // -- remote console --
    #[error("RCON authentication failed")]
    AuthenticationFailed,

    #[error("RCON communication failed: {0}")]
    CommunicationFailed(#[source] std::io::Error),

    // -- provisioning --
    #[error("Server instance already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Artifact download failed: {0}")]
    DownloadFailed(String),

    #[error("Timed out waiting for {0} during bootstrap")]
    BootstrapTimeout(String),

    #[error("License file missing: {0}")]
    LicenseFileMissing(String),

    #[error("Timed out waiting for configuration file {0}")]
    ConfigTimeout(String),

    #[error("Interrupted while waiting for {0}")]
    InterruptedWaiting(String),

    #[error("{source}; cleanup of {path} also failed: {cleanup}")]
    CleanupFailed {
        path: String,
        #[source]
        source: Box<ManagerError>,
        cleanup: std::io::Error,
    },

    // -- backups --
    #[error("Server instance {0} is running")]
    InstanceRunning(String),

    #[error("No backups found in {0}")]
    NoBackupsFound(String),

    // -- ambient --
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::EnvironmentInvalid(_)
            | ManagerError::SupervisorLaunchFailed(_)
            | ManagerError::DownloadFailed(_)
            | ManagerError::LicenseFileMissing(_)
            | ManagerError::ConfigError(_) => ErrorKind::Environment,
            ManagerError::BootstrapTimeout(_) | ManagerError::ConfigTimeout(_) => ErrorKind::Timeout,
            ManagerError::AuthenticationFailed | ManagerError::CommunicationFailed(_) => {
                ErrorKind::Communication
            }
            ManagerError::AlreadyRunning(_)
            | ManagerError::NotRunning(_)
            | ManagerError::AlreadyInitialized(_)
            | ManagerError::InstanceRunning(_)
            | ManagerError::Conflict(_) => ErrorKind::State,
            ManagerError::CleanupFailed { .. } => ErrorKind::Cleanup,
            _ => ErrorKind::Other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ManagerError::NotFound(_) | ManagerError::NoBackupsFound(_) => StatusCode::NOT_FOUND,
            ManagerError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::State => StatusCode::CONFLICT,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Communication => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
