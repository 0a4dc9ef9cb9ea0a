//! Detached named sessions

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ManagerError;

/// Launches, queries and kills named detached sessions
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Whether a session called `name` is alive
    async fn has_session(&self, name: &str) -> bool;

    /// Start `command` in `workdir` inside a new session, appending its
    /// combined output to `log_file` (relative to `workdir`)
    async fn new_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &str,
        log_file: &str,
    ) -> Result<(), ManagerError>;

    async fn kill_session(&self, name: &str) -> Result<(), ManagerError>;
}

/// Sessions backed by tmux
#[derive(Debug, Clone)]
pub struct TmuxLauncher {
    program: String,
}

impl Default for TmuxLauncher {
    fn default() -> Self {
        Self {
            program: "tmux".to_string(),
        }
    }
}

impl TmuxLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Quote `s` for a POSIX shell
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// `=` makes tmux match the session name exactly instead of by prefix
fn exact_target(name: &str) -> String {
    format!("={}", name)
}

#[async_trait]
impl SessionLauncher for TmuxLauncher {
    async fn has_session(&self, name: &str) -> bool {
        let status = Command::new(&self.program)
            .args(["has-session", "-t", &exact_target(name)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                warn!("Failed to run {} has-session: {}", self.program, e);
                false
            }
        }
    }

    async fn new_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &str,
        log_file: &str,
    ) -> Result<(), ManagerError> {
        let shell_command = format!(
            "cd {} && {} >> {} 2>&1",
            shell_quote(&workdir.to_string_lossy()),
            command,
            shell_quote(log_file)
        );
        debug!("Starting session {}: {}", name, shell_command);

        let output = Command::new(&self.program)
            .args(["new-session", "-d", "-s", name, &shell_command])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ManagerError::SupervisorLaunchFailed(format!(
                    "failed to run {}: {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            return Err(ManagerError::SupervisorLaunchFailed(format!(
                "{} new-session exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), ManagerError> {
        let output = Command::new(&self.program)
            .args(["kill-session", "-t", &exact_target(name)])
            .output()
            .await?;
        if !output.status.success() {
            return Err(ManagerError::ServerError(format!(
                "{} kill-session exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
