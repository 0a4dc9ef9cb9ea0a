//! Backup operations

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::Repositories;
use crate::backup::BackupManager;
use crate::errors::ManagerError;
use crate::models::Backup;
use crate::store::{Filter, OrderBy};

pub struct BackupService {
    repos: Repositories,
    manager: Arc<BackupManager>,
}

impl BackupService {
    pub fn new(repos: Repositories, manager: Arc<BackupManager>) -> Self {
        Self { repos, manager }
    }

    /// Backups of an instance, oldest first
    pub async fn list(&self, instance_id: Uuid) -> Result<Vec<Backup>, ManagerError> {
        self.repos
            .backups
            .query(
                &[Filter::eq("server_instance_id", instance_id)],
                Some(OrderBy::asc("timestamp")),
            )
            .await
    }

    /// Snapshot the instance on behalf of `actor_id` and record the backup
    pub async fn create(&self, instance_id: Uuid, actor_id: Uuid) -> Result<Backup, ManagerError> {
        let instance = self
            .repos
            .instances
            .get(instance_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("server instance {}", instance_id)))?;
        if !instance.license_accepted() {
            return Err(ManagerError::Conflict(format!(
                "server instance {} is not provisioned",
                instance_id
            )));
        }
        let actor = self
            .repos
            .users
            .get(actor_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("user {}", actor_id)))?;

        let backup = self.manager.create(&instance, &actor).await?;
        self.repos.backups.add(&backup).await?;
        info!("Created backup {} of {}", backup.id, instance_id);
        Ok(backup)
    }

    /// Restore from the snapshot's own metadata, so this also works when the
    /// records are gone
    pub async fn restore(&self, instance_id: Uuid, backup_id: Uuid) -> Result<Backup, ManagerError> {
        let backup = self.manager.load(instance_id, backup_id).await?;
        self.manager.restore(&backup).await?;
        info!("Restored backup {} of {}", backup_id, instance_id);
        Ok(backup)
    }

    pub async fn latest(&self, instance_id: Uuid) -> Result<Backup, ManagerError> {
        self.manager.latest(instance_id).await
    }
}
