//! Application state management

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::options::AppOptions;
use crate::backup::BackupManager;
use crate::errors::ManagerError;
use crate::jobs::JobRegistry;
use crate::provision::Provisioner;
use crate::rcon::RconClients;
use crate::services::{BackupService, InstanceService, Repositories, UserService};
use crate::supervisor::{ProcessSupervisor, SessionLauncher};
use crate::workers::provisioning::{self, ProvisioningContext};

/// Main application state
pub struct AppState {
    /// Persisted records
    pub repos: Repositories,

    /// Provisioning jobs
    pub jobs: Arc<JobRegistry>,

    pub instances: Arc<InstanceService>,
    pub backups: Arc<BackupService>,
    pub users: Arc<UserService>,

    /// Cancels in-flight provisioning and stop waits
    cancel: CancellationToken,
}

impl AppState {
    /// Initialize application state and start the provisioning workers
    pub async fn init(
        options: &AppOptions,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Result<(Self, Vec<JoinHandle<()>>), ManagerError> {
        info!("Initializing application state...");

        let layout = options.layout.clone();
        layout.setup().await?;

        let repos = Repositories::json(&layout.data_dir());
        let cancel = CancellationToken::new();

        let rcon = Arc::new(RconClients::new(
            repos.properties.clone(),
            options.rcon_connect_timeout,
        ));
        let supervisor = Arc::new(ProcessSupervisor::new(
            launcher,
            layout.clone(),
            rcon.clone(),
            options.supervisor.clone(),
        ));

        let provisioner = Arc::new(Provisioner::new(layout.clone(), options.provision.clone())?);
        let context = Arc::new(ProvisioningContext {
            provisioner,
            instances: repos.instances.clone(),
            properties: repos.properties.clone(),
        });
        let (queue, handles) =
            provisioning::spawn(options.provisioning_workers, context, cancel.clone());

        let jobs = Arc::new(JobRegistry::new());
        let instances = Arc::new(InstanceService::new(
            layout.clone(),
            repos.clone(),
            jobs.clone(),
            queue,
            supervisor.clone(),
            rcon.clone(),
            cancel.clone(),
        ));

        let backup_manager = Arc::new(BackupManager::new(
            layout,
            supervisor,
            rcon,
            repos.instances.clone(),
            repos.users.clone(),
            repos.backups.clone(),
        ));
        let backups = Arc::new(BackupService::new(repos.clone(), backup_manager));
        let users = Arc::new(UserService::new(repos.clone()));

        let state = Self {
            repos,
            jobs,
            instances,
            backups,
            users,
            cancel,
        };

        Ok((state, handles))
    }

    /// Cancel provisioning and pending stop waits
    pub fn shutdown(&self) {
        info!("Shutting down application state...");
        self.cancel.cancel();
    }
}
