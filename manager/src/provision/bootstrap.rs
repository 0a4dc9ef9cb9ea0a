//! First-run execution of a freshly downloaded artifact

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ManagerError;
use crate::filesys::file::File;
use crate::storage::layout::ARTIFACT_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Appeared,
    TimedOut,
    Cancelled,
}

/// Poll for `file` every `poll` until it exists, `timeout` elapses or
/// `cancel` fires
pub async fn wait_for_file(
    file: &File,
    timeout: Duration,
    poll: Duration,
    cancel: &CancellationToken,
) -> WaitOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        if file.exists().await {
            return WaitOutcome::Appeared;
        }
        if Instant::now() >= deadline {
            return WaitOutcome::TimedOut;
        }
        tokio::select! {
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

/// Program and arguments launching an artifact for its first run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BootstrapCommand {
    /// `<java> -jar server.jar nogui`
    pub fn java(java_bin: impl Into<String>) -> Self {
        Self {
            program: java_bin.into(),
            args: vec![
                "-jar".to_string(),
                ARTIFACT_FILE.to_string(),
                "nogui".to_string(),
            ],
        }
    }

    /// Spawn in `workdir` with stdout and stderr appended to `log_file`.
    /// The child is killed if the handle is dropped.
    pub async fn spawn(&self, workdir: &Path, log_file: &File) -> Result<Child, ManagerError> {
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file.path())
            .await?
            .into_std()
            .await;
        let log_err = log.try_clone()?;

        debug!(
            "Bootstrapping {} {:?} in {}",
            self.program,
            self.args,
            workdir.display()
        );
        Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ManagerError::EnvironmentInvalid(format!(
                    "failed to launch {}: {}",
                    self.program, e
                ))
            })
    }

    /// Run until `target` appears.
    ///
    /// The process is terminated and reaped before returning, whatever the
    /// outcome.
    pub async fn run_until_file_exists(
        &self,
        workdir: &Path,
        log_file: &File,
        target: &File,
        timeout: Duration,
        poll: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, ManagerError> {
        let mut child = self.spawn(workdir, log_file).await?;
        let outcome = wait_for_file(target, timeout, poll, cancel).await;
        terminate(&mut child).await;
        Ok(outcome)
    }
}

/// Kill `child` and wait until it has exited
pub async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        // already exited
        debug!("Bootstrap process kill: {}", e);
    }
    match child.wait().await {
        Ok(status) => debug!("Bootstrap process exited with {}", status),
        Err(e) => warn!("Failed to wait for bootstrap process: {}", e),
    }
}
