//! Application configuration options

use std::time::Duration;

use crate::provision::{BootstrapCommand, ProvisionOptions};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::supervisor::SupervisorOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Number of provisioning workers
    pub provisioning_workers: usize,

    /// Start/stop behaviour of game servers
    pub supervisor: SupervisorOptions,

    /// Artifact bootstrap behaviour
    pub provision: ProvisionOptions,

    /// Remote console connect timeout
    pub rcon_connect_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            enable_socket_server: true,
            server: ServerOptions::default(),
            provisioning_workers: 3,
            supervisor: SupervisorOptions::default(),
            provision: ProvisionOptions::default(),
            rcon_connect_timeout: Duration::from_secs(5),
        }
    }
}

impl AppOptions {
    /// Options for `layout` as configured by `settings`
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let timings = &settings.timings;
        let layout = match &settings.server_root {
            Some(root) => layout.with_server_root(root),
            None => layout,
        };

        Self {
            layout,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            provisioning_workers: settings.worker_count(),
            supervisor: SupervisorOptions {
                java_bin: settings.java_bin.clone(),
                stop_timeout: Duration::from_millis(timings.stop_timeout_ms),
                stop_poll: Duration::from_millis(timings.stop_poll_ms),
            },
            provision: ProvisionOptions {
                bootstrap: BootstrapCommand::java(settings.java_bin.clone()),
                bootstrap_timeout: Duration::from_millis(timings.bootstrap_timeout_ms),
                config_timeout: Duration::from_millis(timings.bootstrap_timeout_ms),
                poll_interval: Duration::from_millis(timings.bootstrap_poll_ms),
            },
            rcon_connect_timeout: Duration::from_millis(timings.rcon_connect_timeout_ms),
            ..Default::default()
        }
    }
}

/// Lifecycle options for the manager
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8470,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "server_root": "/srv/games",
                "server": {"port": 9000},
                "provisioning_workers": 0,
                "timings": {"stop_timeout_ms": 5000, "bootstrap_poll_ms": 100},
                "java_bin": "/opt/java/bin/java"
            }"#,
        )
        .unwrap();
        let options = AppOptions::from_settings(StorageLayout::new("/var/lib/gsmgr"), &settings);

        assert_eq!(options.server.host, "127.0.0.1");
        assert_eq!(options.server.port, 9000);
        assert_eq!(options.provisioning_workers, 1);
        assert_eq!(options.supervisor.stop_timeout, Duration::from_secs(5));
        assert_eq!(options.supervisor.stop_poll, Duration::from_secs(1));
        assert_eq!(options.provision.poll_interval, Duration::from_millis(100));
        assert_eq!(options.provision.bootstrap.program, "/opt/java/bin/java");
        assert_eq!(
            options.layout.servers_dir().path(),
            std::path::Path::new("/srv/games")
        );
        assert_eq!(
            options.layout.data_dir().path(),
            std::path::Path::new("/var/lib/gsmgr/data")
        );
    }
}
