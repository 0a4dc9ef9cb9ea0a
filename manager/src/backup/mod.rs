//! Instance snapshots
//!
//! A backup is a copy of the instance directory (minus `backups/` itself)
//! under `backups/<backup-id>/`, plus a `metadata.json` describing the
//! backup, the instance and the creator at snapshot time.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::filesys::dir::Dir;
use crate::models::{Backup, BackupManifest, ServerInstance, User};
use crate::rcon::RconClients;
use crate::storage::layout::{StorageLayout, BACKUPS_DIR, BACKUP_METADATA_FILE};
use crate::store::Repository;
use crate::supervisor::ProcessSupervisor;

const BACKUP_STARTED_NOTICE: &str = "say Backing up server...";
const BACKUP_COMPLETE_NOTICE: &str = "say Backup complete.";

pub struct BackupManager {
    layout: StorageLayout,
    supervisor: Arc<ProcessSupervisor>,
    rcon: Arc<RconClients>,
    instances: Arc<dyn Repository<ServerInstance>>,
    users: Arc<dyn Repository<User>>,
    backups: Arc<dyn Repository<Backup>>,
}

impl BackupManager {
    pub fn new(
        layout: StorageLayout,
        supervisor: Arc<ProcessSupervisor>,
        rcon: Arc<RconClients>,
        instances: Arc<dyn Repository<ServerInstance>>,
        users: Arc<dyn Repository<User>>,
        backups: Arc<dyn Repository<Backup>>,
    ) -> Self {
        Self {
            layout,
            supervisor,
            rcon,
            instances,
            users,
            backups,
        }
    }

    async fn notify(&self, instance: &ServerInstance, message: &str) {
        if let Err(e) = self.rcon.send_command(instance, message).await {
            warn!("Failed to notify {} over RCON: {}", instance.id(), e);
        }
    }

    /// Snapshot the instance directory
    pub async fn create(&self, instance: &ServerInstance, actor: &User) -> Result<Backup, ManagerError> {
        let paths = self.layout.instance(instance.id());
        if !paths.root().exists().await {
            return Err(ManagerError::EnvironmentInvalid(format!(
                "instance directory {} does not exist",
                paths.root().path().display()
            )));
        }

        let running = self.supervisor.is_running(instance.id()).await;
        if running {
            self.notify(instance, BACKUP_STARTED_NOTICE).await;
        }

        let backup = Backup::new(instance.id(), actor.id);
        let dest = paths.backup_dir(backup.id);
        info!("Backing up {} to {}", instance.id(), dest.path().display());

        let manifest = BackupManifest {
            backup: backup.clone(),
            instance: instance.clone(),
            created_by: actor.clone(),
        };
        let result = async {
            let copied = paths.root().copy_into(&dest, &[BACKUPS_DIR]).await?;
            dest.file(BACKUP_METADATA_FILE).write_json(&manifest).await?;
            Ok::<_, ManagerError>(copied)
        }
        .await;

        let copied = match result {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(cleanup) = dest.remove_all().await {
                    warn!(
                        "Failed to remove partial backup {}: {}",
                        dest.path().display(),
                        cleanup
                    );
                }
                return Err(e);
            }
        };
        debug!("Backup {} holds {} files", backup.id, copied);

        if running {
            self.notify(instance, BACKUP_COMPLETE_NOTICE).await;
        }
        Ok(backup)
    }

    /// Read a backup's metadata from its snapshot directory
    pub async fn load(&self, instance_id: Uuid, backup_id: Uuid) -> Result<Backup, ManagerError> {
        Ok(self.manifest(instance_id, backup_id).await?.backup)
    }

    async fn manifest(&self, instance_id: Uuid, backup_id: Uuid) -> Result<BackupManifest, ManagerError> {
        let dir = self.layout.instance(instance_id).backup_dir(backup_id);
        let file = dir.file(BACKUP_METADATA_FILE);
        if !file.exists().await {
            return Err(ManagerError::NotFound(format!("backup {}", backup_id)));
        }
        file.read_json().await
    }

    /// Copy a snapshot back over the instance directory and upsert the
    /// instance, creator and backup records, in that order.
    ///
    /// The upserts are not transactional: a failure part way leaves the
    /// earlier records written.
    pub async fn restore(&self, backup: &Backup) -> Result<(), ManagerError> {
        let instance_id = backup.server_instance_id;
        if self.supervisor.is_running(instance_id).await {
            return Err(ManagerError::InstanceRunning(instance_id.to_string()));
        }

        let manifest = self.manifest(instance_id, backup.id).await?;
        let paths = self.layout.instance(instance_id);
        let source = paths.backup_dir(backup.id);

        info!("Restoring backup {} into {}", backup.id, paths.root().path().display());
        let copied = source
            .copy_into(paths.root(), &[BACKUP_METADATA_FILE])
            .await?;
        debug!("Restored {} files", copied);

        let mut step = "instance";
        let result = async {
            self.instances.upsert(&manifest.instance).await?;
            step = "user";
            self.users.upsert(&manifest.created_by).await?;
            step = "backup";
            self.backups.upsert(&manifest.backup).await
        }
        .await;

        if let Err(e) = &result {
            error!(
                "Restore of backup {} failed while upserting the {} record: {}",
                backup.id, step, e
            );
        }
        result
    }

    /// Most recently modified backup of an instance
    pub async fn latest(&self, instance_id: Uuid) -> Result<Backup, ManagerError> {
        let backups_dir = self.layout.instance(instance_id).backups_dir();
        let no_backups = || ManagerError::NoBackupsFound(backups_dir.path().display().to_string());
        if !backups_dir.exists().await {
            return Err(no_backups());
        }

        let mut newest = None;
        for path in backups_dir.list_dirs().await? {
            let dir = Dir::new(path);
            let modified = dir.modified().await?;
            if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
                newest = Some((modified, dir));
            }
        }

        let (_, dir) = newest.ok_or_else(no_backups)?;
        let manifest: BackupManifest = dir.file(BACKUP_METADATA_FILE).read_json().await?;
        Ok(manifest.backup)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::instance::sample;
    use crate::models::ServerInstanceProperty;
    use crate::properties::{RCON_PASSWORD_KEY, RCON_PORT_KEY};
    use crate::rcon::testing::FakeRconServer;
    use crate::store::MemoryRepository;
    use crate::supervisor::session::testing::FakeLauncher;
    use crate::supervisor::SupervisorOptions;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        layout: StorageLayout,
        launcher: Arc<FakeLauncher>,
        rcon_server: FakeRconServer,
        instances: Arc<MemoryRepository<ServerInstance>>,
        users: Arc<MemoryRepository<User>>,
        backups: Arc<MemoryRepository<Backup>>,
        manager: BackupManager,
        instance: ServerInstance,
        actor: User,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path());
        let rcon_server = FakeRconServer::start("pw").await;

        let mut instance = sample(25564);
        instance.accept_license();
        let properties: Arc<MemoryRepository<ServerInstanceProperty>> =
            Arc::new(MemoryRepository::new());
        properties
            .add(&ServerInstanceProperty::new(
                instance.id(),
                RCON_PORT_KEY,
                rcon_server.port.to_string(),
            ))
            .await
            .unwrap();
        properties
            .add(&ServerInstanceProperty::new(instance.id(), RCON_PASSWORD_KEY, "pw"))
            .await
            .unwrap();

        let rcon = Arc::new(RconClients::new(properties, Duration::from_secs(1)));
        let launcher = Arc::new(FakeLauncher::default());
        let supervisor = Arc::new(ProcessSupervisor::new(
            launcher.clone(),
            layout.clone(),
            rcon.clone(),
            SupervisorOptions::default(),
        ));
        let instances: Arc<MemoryRepository<ServerInstance>> = Arc::new(MemoryRepository::new());
        let users: Arc<MemoryRepository<User>> = Arc::new(MemoryRepository::new());
        let backups: Arc<MemoryRepository<Backup>> = Arc::new(MemoryRepository::new());
        let manager = BackupManager::new(
            layout.clone(),
            supervisor,
            rcon,
            instances.clone(),
            users.clone(),
            backups.clone(),
        );

        let root = layout.instance(instance.id());
        root.artifact_file().write_bytes(b"jar").await.unwrap();
        root.root()
            .file("world/region/r.0.0.mca")
            .write_bytes(&[1, 2, 3, 0, 255])
            .await
            .unwrap();

        Fixture {
            _tmp: tmp,
            layout,
            launcher,
            rcon_server,
            instances,
            users,
            backups,
            manager,
            instance,
            actor: User::new("steve"),
        }
    }

    #[tokio::test]
    async fn test_backup_then_restore_reproduces_files() {
        let f = fixture().await;
        let backup = f.manager.create(&f.instance, &f.actor).await.unwrap();

        let paths = f.layout.instance(f.instance.id());
        let region = paths.root().file("world/region/r.0.0.mca");
        region.delete().await.unwrap();
        assert!(!region.exists().await);

        f.manager.restore(&backup).await.unwrap();
        assert_eq!(
            tokio::fs::read(region.path()).await.unwrap(),
            vec![1, 2, 3, 0, 255]
        );
        assert!(!paths.root().file(BACKUP_METADATA_FILE).exists().await);

        assert_eq!(f.instances.get(f.instance.id()).await.unwrap().unwrap(), f.instance);
        assert_eq!(f.users.get(f.actor.id).await.unwrap().unwrap(), f.actor);
        assert_eq!(f.backups.get(backup.id).await.unwrap().unwrap(), backup);
    }

    #[tokio::test]
    async fn test_snapshot_excludes_backups_and_writes_metadata() {
        let f = fixture().await;
        let first = f.manager.create(&f.instance, &f.actor).await.unwrap();
        let second = f.manager.create(&f.instance, &f.actor).await.unwrap();

        let paths = f.layout.instance(f.instance.id());
        let dir = paths.backup_dir(second.id);
        assert!(dir.file("server.jar").exists().await);
        assert!(!dir.subdir(BACKUPS_DIR).exists().await);

        let loaded = f.manager.load(f.instance.id(), first.id).await.unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.created_by, f.actor.id);
    }

    #[tokio::test]
    async fn test_restore_while_running_touches_nothing() {
        let f = fixture().await;
        let backup = f.manager.create(&f.instance, &f.actor).await.unwrap();

        let paths = f.layout.instance(f.instance.id());
        let region = paths.root().file("world/region/r.0.0.mca");
        region.write_bytes(b"changed").await.unwrap();
        f.launcher
            .sessions
            .lock()
            .unwrap()
            .insert(f.instance.id().to_string());

        let err = f.manager.restore(&backup).await.unwrap_err();
        assert!(matches!(err, ManagerError::InstanceRunning(_)));
        assert_eq!(region.read_string().await.unwrap(), "changed");
        assert!(f.instances.is_empty());
    }

    #[tokio::test]
    async fn test_running_instance_gets_notices() {
        let f = fixture().await;
        f.launcher
            .sessions
            .lock()
            .unwrap()
            .insert(f.instance.id().to_string());

        f.manager.create(&f.instance, &f.actor).await.unwrap();
        assert_eq!(
            f.rcon_server.commands(),
            vec![BACKUP_STARTED_NOTICE.to_string(), BACKUP_COMPLETE_NOTICE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_stopped_instance_gets_no_notices() {
        let f = fixture().await;
        f.manager.create(&f.instance, &f.actor).await.unwrap();
        assert!(f.rcon_server.commands().is_empty());
    }

    #[tokio::test]
    async fn test_latest() {
        let f = fixture().await;
        let err = f.manager.latest(f.instance.id()).await.unwrap_err();
        assert!(matches!(err, ManagerError::NoBackupsFound(_)));

        f.manager.create(&f.instance, &f.actor).await.unwrap();
        // mtime resolution on some filesystems is coarse
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let newest = f.manager.create(&f.instance, &f.actor).await.unwrap();

        assert_eq!(f.manager.latest(f.instance.id()).await.unwrap(), newest);
    }

    #[tokio::test]
    async fn test_backup_without_instance_directory_creates_nothing() {
        let f = fixture().await;
        let other = sample(25600);
        let root = f.layout.instance(other.id()).root().clone();

        let err = f.manager.create(&other, &f.actor).await.unwrap_err();
        assert!(matches!(err, ManagerError::EnvironmentInvalid(_)));
        assert!(!root.exists().await);
    }

    #[tokio::test]
    async fn test_missing_backup_is_not_found() {
        let f = fixture().await;
        let err = f
            .manager
            .load(f.instance.id(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
    }
}
