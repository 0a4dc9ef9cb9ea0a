//! Instance operations

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::Repositories;
use crate::errors::ManagerError;
use crate::jobs::{JobRegistry, JobStatus};
use crate::models::{NewServerInstance, ServerInstance, ServerInstanceProperty};
use crate::properties::{PropertiesManager, RCON_PORT_KEY, SERVER_PORT_KEY};
use crate::rcon::RconClients;
use crate::storage::layout::StorageLayout;
use crate::store::{query_unique, Filter, OrderBy};
use crate::supervisor::ProcessSupervisor;
use crate::workers::provisioning::{ProvisionRequest, ProvisioningQueue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub id: Uuid,
    pub provisioned: bool,
    pub running: bool,
}

pub struct InstanceService {
    layout: StorageLayout,
    repos: Repositories,
    jobs: Arc<JobRegistry>,
    queue: ProvisioningQueue,
    supervisor: Arc<ProcessSupervisor>,
    rcon: Arc<RconClients>,
    properties: PropertiesManager,
    shutdown: CancellationToken,
}

impl InstanceService {
    pub fn new(
        layout: StorageLayout,
        repos: Repositories,
        jobs: Arc<JobRegistry>,
        queue: ProvisioningQueue,
        supervisor: Arc<ProcessSupervisor>,
        rcon: Arc<RconClients>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            properties: PropertiesManager::new(layout.clone()),
            layout,
            repos,
            jobs,
            queue,
            supervisor,
            rcon,
            shutdown,
        }
    }

    // =============================== RECORDS ================================== //

    pub async fn create(&self, new: NewServerInstance) -> Result<ServerInstance, ManagerError> {
        let instance = ServerInstance::new(new)?;
        self.ensure_unique(&instance).await?;
        self.repos.instances.add(&instance).await?;
        info!("Created server instance {} ({})", instance.name(), instance.id());
        Ok(instance)
    }

    async fn ensure_unique(&self, instance: &ServerInstance) -> Result<(), ManagerError> {
        let same_name = query_unique(
            self.repos.instances.as_ref(),
            &[Filter::eq("name", instance.name())],
        )
        .await?;
        if same_name.is_some_and(|other| other.id() != instance.id()) {
            return Err(ManagerError::Conflict(format!(
                "name {} is already in use",
                instance.name()
            )));
        }

        let same_port = self
            .repos
            .instances
            .query(&[Filter::eq("port", i64::from(instance.port()))], None)
            .await?;
        if same_port.iter().any(|other| other.id() != instance.id()) {
            return Err(ManagerError::Conflict(format!(
                "port {} is already in use",
                instance.port()
            )));
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ServerInstance>, ManagerError> {
        self.repos
            .instances
            .query(&[], Some(OrderBy::asc("created_at")))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<ServerInstance, ManagerError> {
        self.repos
            .instances
            .get(id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("server instance {}", id)))
    }

    async fn ensure_stopped(&self, id: Uuid) -> Result<(), ManagerError> {
        if self.supervisor.is_running(id).await {
            return Err(ManagerError::InstanceRunning(id.to_string()));
        }
        Ok(())
    }

    /// Remove the record and its properties; files stay until [`Self::clean`]
    pub async fn delete(&self, id: Uuid) -> Result<(), ManagerError> {
        let instance = self.get(id).await?;
        self.ensure_stopped(id).await?;

        for property in self.all_properties(id).await? {
            self.repos.properties.delete(property.id).await?;
        }
        self.repos.instances.delete(id).await?;
        self.rcon.evict(id);
        info!("Deleted server instance {} ({})", instance.name(), id);
        Ok(())
    }

    pub async fn set_allocated_ram(&self, id: Uuid, ram_mb: u32) -> Result<ServerInstance, ManagerError> {
        let mut instance = self.get(id).await?;
        self.ensure_stopped(id).await?;
        instance.set_allocated_ram_mb(ram_mb)?;
        self.repos.instances.update(&instance).await?;
        Ok(instance)
    }

    /// Change the game port; the reserved port properties follow and the
    /// configuration file is rewritten for provisioned instances
    pub async fn set_port(&self, id: Uuid, port: u16) -> Result<ServerInstance, ManagerError> {
        let mut instance = self.get(id).await?;
        self.ensure_stopped(id).await?;
        instance.set_port(port)?;
        self.ensure_unique(&instance).await?;
        self.repos.instances.update(&instance).await?;

        let mut properties = self.all_properties(id).await?;
        for property in properties.iter_mut() {
            let value = match property.key.as_str() {
                SERVER_PORT_KEY => instance.port(),
                RCON_PORT_KEY => instance.rcon_port(),
                _ => continue,
            };
            property.set_value(value.to_string());
            self.repos.properties.update(property).await?;
        }
        self.rcon.evict(id);

        if instance.license_accepted() {
            self.properties.write(&instance, &properties).await?;
        }
        Ok(instance)
    }

    // =============================== PROVISIONING ================================== //

    /// Queue provisioning and return the job id
    pub async fn start_provisioning(&self, id: Uuid) -> Result<Uuid, ManagerError> {
        let instance = self.get(id).await?;
        if instance.license_accepted() {
            return Err(ManagerError::AlreadyInitialized(id.to_string()));
        }

        let job = self.jobs.create();
        let job_id = job.id();
        self.queue.submit(ProvisionRequest { job, instance })?;
        info!("Queued provisioning of {} as job {}", id, job_id);
        Ok(job_id)
    }

    pub fn job(&self, job_id: Uuid) -> Result<JobStatus, ManagerError> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| ManagerError::NotFound(format!("job {}", job_id)))
    }

    // =============================== LIFECYCLE ================================== //

    pub async fn start(&self, id: Uuid) -> Result<(), ManagerError> {
        let instance = self.get(id).await?;
        self.supervisor.start(&instance).await
    }

    pub async fn stop(&self, id: Uuid) -> Result<(), ManagerError> {
        let instance = self.get(id).await?;
        self.supervisor.stop(&instance, &self.shutdown).await
    }

    pub async fn status(&self, id: Uuid) -> Result<InstanceStatus, ManagerError> {
        let instance = self.get(id).await?;
        Ok(InstanceStatus {
            id,
            provisioned: instance.license_accepted(),
            running: self.supervisor.is_running(id).await,
        })
    }

    /// Run a console command on a running instance
    pub async fn command(&self, id: Uuid, command: &str) -> Result<String, ManagerError> {
        let instance = self.get(id).await?;
        if !self.supervisor.is_running(id).await {
            return Err(ManagerError::NotRunning(id.to_string()));
        }
        self.rcon.send_command(&instance, command).await
    }

    /// Console output lines, skipping the first `from_line`
    pub async fn log(&self, id: Uuid, from_line: Option<usize>) -> Result<Vec<String>, ManagerError> {
        self.get(id).await?;
        let file = self.layout.instance(id).console_log_file();
        if !file.exists().await {
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(file.path()).await?;
        let contents = String::from_utf8_lossy(&bytes);
        Ok(contents
            .lines()
            .skip(from_line.unwrap_or(0))
            .map(str::to_string)
            .collect())
    }

    /// Delete the files of a deleted instance
    pub async fn clean(&self, id: Uuid) -> Result<(), ManagerError> {
        if self.repos.instances.exists(id).await? {
            return Err(ManagerError::Conflict(format!(
                "server instance {} must be deleted before its files are removed",
                id
            )));
        }
        self.ensure_stopped(id).await?;
        let paths = self.layout.instance(id);
        paths.root().remove_all().await?;
        info!("Removed files of server instance {}", id);
        Ok(())
    }

    // =============================== PROPERTIES ================================== //

    async fn all_properties(&self, id: Uuid) -> Result<Vec<ServerInstanceProperty>, ManagerError> {
        self.repos
            .properties
            .query(&[Filter::eq("server_instance_id", id)], None)
            .await
    }

    /// Visible properties ordered by type
    pub async fn properties(&self, id: Uuid) -> Result<Vec<ServerInstanceProperty>, ManagerError> {
        self.get(id).await?;
        self.repos
            .properties
            .query(
                &[
                    Filter::eq("server_instance_id", id),
                    Filter::eq("hidden", false),
                ],
                Some(OrderBy::asc("type")),
            )
            .await
    }

    pub async fn edit_property(
        &self,
        id: Uuid,
        property_id: Uuid,
        value: String,
    ) -> Result<ServerInstanceProperty, ManagerError> {
        self.get(id).await?;
        let mut property = self
            .repos
            .properties
            .get(property_id)
            .await?
            .filter(|p| p.server_instance_id == id)
            .ok_or_else(|| ManagerError::NotFound(format!("property {}", property_id)))?;
        if property.hidden {
            return Err(ManagerError::ValidationError(format!(
                "property {} is managed by the server manager",
                property.key
            )));
        }

        property.set_value(value);
        self.repos.properties.update(&property).await?;
        Ok(property)
    }

    /// Write every stored property to the configuration file
    pub async fn write_properties(&self, id: Uuid) -> Result<(), ManagerError> {
        let instance = self.get(id).await?;
        if self.supervisor.is_running(id).await {
            return Err(ManagerError::Conflict(format!(
                "server instance {} must be stopped to write its properties",
                id
            )));
        }
        if !instance.license_accepted() {
            return Err(ManagerError::Conflict(format!(
                "server instance {} is not provisioned",
                id
            )));
        }
        let properties = self.all_properties(id).await?;
        self.properties.write(&instance, &properties).await
    }
}
