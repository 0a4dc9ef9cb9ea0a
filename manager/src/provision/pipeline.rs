//! Provisioning pipeline
//!
//! Turns an unprovisioned instance record into a ready-to-run directory:
//!
//! 1. create the instance directory
//! 2. download the artifact
//! 3. run it until the license file is generated
//! 4. accept the license
//! 5. run it again until the configuration file is generated, if needed
//! 6. initialize and write back the properties
//! 7. mark the instance provisioned
//!
//! A failure after step 1 removes the directory again before the error is
//! returned.

use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bootstrap::{BootstrapCommand, WaitOutcome};
use crate::errors::ManagerError;
use crate::filesys::file::File;
use crate::jobs::Job;
use crate::models::{ServerInstance, ServerInstanceProperty};
use crate::properties::PropertiesManager;
use crate::storage::layout::{InstanceLayout, StorageLayout, LICENSE_FILE, PROPERTIES_FILE};

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub bootstrap: BootstrapCommand,
    pub bootstrap_timeout: Duration,
    pub config_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapCommand::java("java"),
            bootstrap_timeout: Duration::from_secs(60),
            config_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct Provisioner {
    http: Client,
    layout: StorageLayout,
    properties: PropertiesManager,
    options: ProvisionOptions,
}

impl Provisioner {
    pub fn new(layout: StorageLayout, options: ProvisionOptions) -> Result<Self, ManagerError> {
        let http = Client::builder()
            .user_agent(concat!("gsmgr/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            properties: PropertiesManager::new(layout.clone()),
            layout,
            options,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Provision `instance`, reporting progress to `job`.
    ///
    /// On success the instance is marked provisioned in memory and the
    /// property rows are returned; persisting both is up to the caller.
    pub async fn provision(
        &self,
        instance: &mut ServerInstance,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServerInstanceProperty>, ManagerError> {
        if instance.license_accepted() {
            return Err(ManagerError::AlreadyInitialized(instance.id().to_string()));
        }
        let paths = self.layout.instance(instance.id());
        info!("Provisioning server instance {} ({})", instance.name(), instance.id());

        job.log("Creating server directory");
        if let Err(e) = paths.root().create_new().await {
            return Err(match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    ManagerError::AlreadyInitialized(paths.root().path().display().to_string())
                }
                _ => ManagerError::IoError(e),
            });
        }

        match self.build(instance, &paths, job, cancel).await {
            Ok(properties) => {
                instance.accept_license();
                info!("Provisioned server instance {}", instance.id());
                Ok(properties)
            }
            Err(e) => {
                error!("Provisioning {} failed: {}", instance.id(), e);
                job.log("Cleaning up server directory");
                Err(rollback(&paths, e).await)
            }
        }
    }

    async fn build(
        &self,
        instance: &ServerInstance,
        paths: &InstanceLayout,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServerInstanceProperty>, ManagerError> {
        job.log(format!(
            "Downloading server artifact from: {}",
            instance.artifact_url()
        ));
        let artifact = paths.artifact_file();
        tokio::select! {
            result = self.download(instance.artifact_url(), &artifact) => result?,
            _ = cancel.cancelled() => {
                return Err(ManagerError::InterruptedWaiting("artifact download".to_string()));
            }
        }

        job.log(format!(
            "Running server to generate {} (this could take a while)",
            LICENSE_FILE
        ));
        let license = paths.license_file();
        match self
            .run_until_file_exists(paths, &license, self.options.bootstrap_timeout, cancel)
            .await?
        {
            WaitOutcome::Appeared => {}
            WaitOutcome::TimedOut => {
                return Err(ManagerError::BootstrapTimeout(LICENSE_FILE.to_string()))
            }
            WaitOutcome::Cancelled => {
                return Err(ManagerError::InterruptedWaiting(LICENSE_FILE.to_string()))
            }
        }

        job.log("Accepting license");
        accept_license(&license).await?;

        let config = paths.properties_file();
        if !config.exists().await {
            job.log(format!("Waiting for {}", PROPERTIES_FILE));
            match self
                .run_until_file_exists(paths, &config, self.options.config_timeout, cancel)
                .await?
            {
                WaitOutcome::Appeared => job.log(format!("{} generated", PROPERTIES_FILE)),
                WaitOutcome::TimedOut => {
                    return Err(ManagerError::ConfigTimeout(PROPERTIES_FILE.to_string()))
                }
                WaitOutcome::Cancelled => {
                    return Err(ManagerError::InterruptedWaiting(PROPERTIES_FILE.to_string()))
                }
            }
        }

        job.log("Initializing properties");
        let properties = self.properties.initialize(instance).await?;
        self.properties.write(instance, &properties).await?;
        Ok(properties)
    }

    async fn run_until_file_exists(
        &self,
        paths: &InstanceLayout,
        target: &File,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, ManagerError> {
        self.options
            .bootstrap
            .run_until_file_exists(
                paths.root().path(),
                &paths.console_log_file(),
                target,
                timeout,
                self.options.poll_interval,
                cancel,
            )
            .await
    }

    async fn download(&self, url: &str, dest: &File) -> Result<(), ManagerError> {
        let failed =
            |e: &dyn std::fmt::Display| ManagerError::DownloadFailed(format!("{}: {}", url, e));

        let mut response = self.http.get(url).send().await.map_err(|e| failed(&e))?;
        if !response.status().is_success() {
            return Err(failed(&response.status()));
        }

        let mut file = tokio::fs::File::create(dest.path())
            .await
            .map_err(|e| failed(&e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| failed(&e))? {
            file.write_all(&chunk).await.map_err(|e| failed(&e))?;
            written += chunk.len() as u64;
        }
        file.sync_all().await.map_err(|e| failed(&e))?;
        drop(file);

        if !dest.exists().await {
            return Err(failed(&"destination file missing after transfer"));
        }
        debug!("Downloaded {} bytes from {}", written, url);
        Ok(())
    }
}

/// Flip `eula=false` to `eula=true`
async fn accept_license(license: &File) -> Result<(), ManagerError> {
    if !license.exists().await {
        return Err(ManagerError::LicenseFileMissing(
            license.path().display().to_string(),
        ));
    }
    let contents = license.read_string().await?;
    license
        .write_string(&contents.replace("eula=false", "eula=true"))
        .await
}

/// Remove the instance directory after a failed run, layering a cleanup
/// failure onto the original error
pub(crate) async fn rollback(paths: &InstanceLayout, error: ManagerError) -> ManagerError {
    match paths.root().remove_all().await {
        Ok(()) => error,
        Err(cleanup) => {
            warn!(
                "Failed to remove {}: {}",
                paths.root().path().display(),
                cleanup
            );
            ManagerError::CleanupFailed {
                path: paths.root().path().display().to_string(),
                source: Box::new(error),
                cleanup,
            }
        }
    }
}
