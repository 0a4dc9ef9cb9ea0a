//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use gsmgr::app::options::AppOptions;
use gsmgr::errors::ManagerError;
use gsmgr::provision::{BootstrapCommand, ProvisionOptions};
use gsmgr::storage::layout::StorageLayout;
use gsmgr::supervisor::{SessionLauncher, SupervisorOptions};
use tokio::net::TcpListener;

/// Writes the license file on the first run and the configuration file
/// once the license is accepted
pub const FAKE_SERVER: &str = "if grep -q eula=true eula.txt 2>/dev/null; then \
    printf 'motd=integration\\nserver-port=1\\ndifficulty=hard\\n' > server.properties; \
    else echo eula=false > eula.txt; fi; exec sleep 30";

/// Launcher that only remembers session names
#[derive(Default)]
pub struct RecordingLauncher {
    pub sessions: Mutex<HashSet<String>>,
}

#[async_trait]
impl SessionLauncher for RecordingLauncher {
    async fn has_session(&self, name: &str) -> bool {
        self.sessions.lock().unwrap().contains(name)
    }

    async fn new_session(
        &self,
        name: &str,
        _workdir: &Path,
        _command: &str,
        _log_file: &str,
    ) -> Result<(), ManagerError> {
        self.sessions.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), ManagerError> {
        self.sessions.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Serve a fake artifact; returns its URL
pub async fn artifact_url() -> String {
    let app = Router::new().route("/server.jar", get(|| async { &b"jar"[..] }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/server.jar", addr)
}

pub fn options(base_dir: &Path) -> AppOptions {
    AppOptions {
        layout: StorageLayout::new(base_dir),
        provisioning_workers: 2,
        supervisor: SupervisorOptions {
            java_bin: "java".to_string(),
            stop_timeout: Duration::from_millis(200),
            stop_poll: Duration::from_millis(20),
        },
        provision: ProvisionOptions {
            bootstrap: BootstrapCommand {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), FAKE_SERVER.to_string()],
            },
            bootstrap_timeout: Duration::from_secs(10),
            config_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(20),
        },
        ..Default::default()
    }
}
