//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ManagerError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::supervisor::{SessionLauncher, TmuxLauncher};

/// Run the manager with game servers supervised in tmux sessions
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ManagerError> {
    run_with(options, Arc::new(TmuxLauncher::default()), shutdown_signal).await
}

/// Run the manager with a custom session launcher
pub async fn run_with(
    options: AppOptions,
    launcher: Arc<dyn SessionLauncher>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ManagerError> {
    info!("Initializing game server manager...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, launcher, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start manager: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    launcher: Arc<dyn SessionLauncher>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, ManagerError> {
    let app_state = init_app_state(options, launcher, shutdown_manager).await?;

    if options.enable_socket_server {
        init_socket_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

async fn init_app_state(
    options: &AppOptions,
    launcher: Arc<dyn SessionLauncher>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, ManagerError> {
    let (app_state, worker_handles) = AppState::init(options, launcher).await?;
    info!(
        "Started {} provisioning workers",
        options.provisioning_workers
    );

    let app_state = Arc::new(app_state);
    shutdown_manager.with_app_state(app_state.clone(), worker_handles)?;

    Ok(app_state)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ManagerError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(
        app_state.instances.clone(),
        app_state.backups.clone(),
        app_state.users.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct AppStateShutdownParams {
    state: Arc<AppState>,
    worker_handles: Vec<JoinHandle<()>>,
}

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<AppStateShutdownParams>,
    socket_server_handle: Option<JoinHandle<Result<(), ManagerError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            socket_server_handle: None,
        }
    }

    pub fn with_app_state(
        &mut self,
        state: Arc<AppState>,
        worker_handles: Vec<JoinHandle<()>>,
    ) -> Result<(), ManagerError> {
        if self.app_state.is_some() {
            return Err(ManagerError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(AppStateShutdownParams {
            state,
            worker_handles,
        });
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ManagerError>>,
    ) -> Result<(), ManagerError> {
        if self.socket_server_handle.is_some() {
            return Err(ManagerError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ManagerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ManagerError> {
        info!("Shutting down game server manager...");

        // 1. Socket server, so no new jobs are queued
        if let Some(handle) = self.socket_server_handle.take() {
            handle
                .await
                .map_err(|e| ManagerError::ShutdownError(e.to_string()))??;
        }

        // 2. Provisioning workers; cancellation rolls back in-flight jobs
        if let Some(app_state) = self.app_state.take() {
            app_state.state.shutdown();
            for handle in app_state.worker_handles {
                handle
                    .await
                    .map_err(|e| ManagerError::ShutdownError(e.to_string()))?;
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}
