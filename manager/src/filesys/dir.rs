//! Directory operations

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use crate::errors::ManagerError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), ManagerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Create the directory, failing with `AlreadyExists` if it is present.
    ///
    /// Parents are created as needed; only the leaf must be new.
    pub async fn create_new(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir(&self.path).await
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), ManagerError> {
        self.remove_all().await?;
        Ok(())
    }

    /// Recursively remove the directory, surfacing the raw I/O error.
    /// Absence is not an error.
    pub async fn remove_all(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// List subdirectories
    pub async fn list_dirs(&self) -> Result<Vec<PathBuf>, ManagerError> {
        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }

        Ok(dirs)
    }

    /// Last modification time of the directory itself
    pub async fn modified(&self) -> Result<SystemTime, ManagerError> {
        Ok(fs::metadata(&self.path).await?.modified()?)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively copy the contents of this directory into `dest`.
    ///
    /// Relative paths are preserved, directories are created as needed and
    /// existing files are overwritten. Top-level entries whose name is in
    /// `skip` are not copied.
    pub async fn copy_into(&self, dest: &Dir, skip: &[&str]) -> Result<u64, ManagerError> {
        fs::create_dir_all(dest.path()).await?;

        let mut copied = 0u64;
        let mut pending = vec![(self.path.clone(), dest.path.clone(), true)];

        while let Some((src, dst, top_level)) = pending.pop() {
            let mut entries = fs::read_dir(&src).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if top_level && skip.iter().any(|s| name == **s) {
                    continue;
                }

                let target = dst.join(&name);
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    fs::create_dir_all(&target).await?;
                    pending.push((entry.path(), target, false));
                } else {
                    fs::copy(entry.path(), &target).await?;
                    copied += 1;
                }
            }
        }

        Ok(copied)
    }
}
