//! Storage layout configuration

use std::path::PathBuf;

use uuid::Uuid;

use crate::errors::ManagerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the executable artifact inside an instance directory
pub const ARTIFACT_FILE: &str = "server.jar";

/// Combined stdout/stderr of the supervised process
pub const CONSOLE_LOG_FILE: &str = "latest.log";

/// License acknowledgement file generated on first run
pub const LICENSE_FILE: &str = "eula.txt";

/// Runtime configuration file generated on first run
pub const PROPERTIES_FILE: &str = "server.properties";

/// Subdirectory holding backup snapshots
pub const BACKUPS_DIR: &str = "backups";

/// Backup metadata file inside each snapshot
pub const BACKUP_METADATA_FILE: &str = "metadata.json";

/// Storage layout for the manager
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for settings and persisted records
    pub base_dir: PathBuf,

    /// Root under which each instance gets `<server_root>/<instance-id>`
    pub server_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout with the server root under the base dir
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let server_root = base_dir.join("servers");
        Self {
            base_dir,
            server_root,
        }
    }

    /// Override the server root
    pub fn with_server_root(mut self, server_root: impl Into<PathBuf>) -> Self {
        self.server_root = server_root.into();
        self
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Directory holding persisted records
    pub fn data_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("data"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Directory containing every instance directory
    pub fn servers_dir(&self) -> Dir {
        Dir::new(&self.server_root)
    }

    /// Layout of a single instance
    pub fn instance(&self, instance_id: Uuid) -> InstanceLayout {
        InstanceLayout {
            root: self.servers_dir().subdir(&instance_id.to_string()),
        }
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ManagerError> {
        self.data_dir().create().await?;
        self.logs_dir().create().await?;
        self.servers_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/gsmgr");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gsmgr");

        Self::new(base_dir)
    }
}

/// Files and directories of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    root: Dir,
}

impl InstanceLayout {
    pub fn root(&self) -> &Dir {
        &self.root
    }

    pub fn artifact_file(&self) -> File {
        self.root.file(ARTIFACT_FILE)
    }

    pub fn console_log_file(&self) -> File {
        self.root.file(CONSOLE_LOG_FILE)
    }

    pub fn license_file(&self) -> File {
        self.root.file(LICENSE_FILE)
    }

    pub fn properties_file(&self) -> File {
        self.root.file(PROPERTIES_FILE)
    }

    pub fn backups_dir(&self) -> Dir {
        self.root.subdir(BACKUPS_DIR)
    }

    pub fn backup_dir(&self, backup_id: Uuid) -> Dir {
        self.backups_dir().subdir(&backup_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_paths() {
        let layout = StorageLayout::new("/tmp/gsmgr").with_server_root("/srv/games");
        let id = Uuid::new_v4();
        let instance = layout.instance(id);

        assert_eq!(
            instance.root().path(),
            PathBuf::from("/srv/games").join(id.to_string())
        );
        assert!(instance.artifact_file().path().ends_with("server.jar"));
        assert!(instance
            .backup_dir(id)
            .path()
            .starts_with(instance.backups_dir().path()));
        assert_eq!(layout.settings_file().path(), PathBuf::from("/tmp/gsmgr/settings.json"));
    }
}
