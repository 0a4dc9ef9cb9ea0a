//! Process supervision
//!
//! Each instance runs inside a detached session named after its id. Start
//! validates the instance directory and launches the artifact; stop asks
//! the server to shut down over RCON and force-kills the session if it is
//! still alive after the stop timeout.

pub mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::models::ServerInstance;
use crate::rcon::RconClients;
use crate::storage::layout::{StorageLayout, ARTIFACT_FILE, CONSOLE_LOG_FILE};

pub use session::{SessionLauncher, TmuxLauncher};

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub java_bin: String,
    pub stop_timeout: Duration,
    pub stop_poll: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            java_bin: "java".to_string(),
            stop_timeout: Duration::from_secs(30),
            stop_poll: Duration::from_secs(1),
        }
    }
}

pub struct ProcessSupervisor {
    launcher: Arc<dyn SessionLauncher>,
    layout: StorageLayout,
    rcon: Arc<RconClients>,
    options: SupervisorOptions,
}

impl ProcessSupervisor {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        layout: StorageLayout,
        rcon: Arc<RconClients>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            launcher,
            layout,
            rcon,
            options,
        }
    }

    fn session_name(instance_id: Uuid) -> String {
        instance_id.to_string()
    }

    pub async fn is_running(&self, instance_id: Uuid) -> bool {
        self.launcher
            .has_session(&Self::session_name(instance_id))
            .await
    }

    /// Command line launching the artifact with the instance's memory
    pub fn launch_command(&self, instance: &ServerInstance) -> String {
        format!(
            "{java} -Xmx{ram}M -Xms{ram}M -jar {jar} nogui",
            java = session::shell_quote(&self.options.java_bin),
            ram = instance.allocated_ram_mb(),
            jar = ARTIFACT_FILE,
        )
    }

    pub async fn start(&self, instance: &ServerInstance) -> Result<(), ManagerError> {
        if self.is_running(instance.id()).await {
            return Err(ManagerError::AlreadyRunning(instance.id().to_string()));
        }

        let paths = self.layout.instance(instance.id());
        if !paths.root().exists().await {
            return Err(ManagerError::EnvironmentInvalid(format!(
                "instance directory {} does not exist",
                paths.root().path().display()
            )));
        }
        if !paths.artifact_file().exists().await {
            return Err(ManagerError::EnvironmentInvalid(format!(
                "{} not found in {}",
                ARTIFACT_FILE,
                paths.root().path().display()
            )));
        }

        self.launcher
            .new_session(
                &Self::session_name(instance.id()),
                paths.root().path(),
                &self.launch_command(instance),
                CONSOLE_LOG_FILE,
            )
            .await?;

        info!("Started server instance {} ({})", instance.name(), instance.id());
        Ok(())
    }

    /// Stop gracefully, falling back to killing the session.
    ///
    /// Cancelling `cancel` while waiting kills the session and returns
    /// [`ManagerError::InterruptedWaiting`].
    pub async fn stop(
        &self,
        instance: &ServerInstance,
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        if !self.is_running(instance.id()).await {
            return Err(ManagerError::NotRunning(instance.id().to_string()));
        }

        self.rcon.send_command(instance, "stop").await?;
        debug!("Sent stop to {}, waiting for exit", instance.id());

        let deadline = Instant::now() + self.options.stop_timeout;
        while self.is_running(instance.id()).await && Instant::now() < deadline {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.kill(instance).await?;
                    return Err(ManagerError::InterruptedWaiting(format!(
                        "server instance {} to stop",
                        instance.id()
                    )));
                }
                _ = tokio::time::sleep(self.options.stop_poll) => {}
            }
        }

        if self.is_running(instance.id()).await {
            warn!(
                "Server instance {} still running after {:?}, killing session",
                instance.id(),
                self.options.stop_timeout
            );
            self.kill(instance).await?;
        }

        info!("Stopped server instance {} ({})", instance.name(), instance.id());
        Ok(())
    }

    /// Kill the session; a session that exited on its own counts as killed
    async fn kill(&self, instance: &ServerInstance) -> Result<(), ManagerError> {
        match self
            .launcher
            .kill_session(&Self::session_name(instance.id()))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if !self.is_running(instance.id()).await => {
                debug!("Session of {} already gone: {}", instance.id(), e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
