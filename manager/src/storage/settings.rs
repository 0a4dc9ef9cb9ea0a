//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ManagerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Write daily-rolling log files under the base directory
    #[serde(default = "default_true")]
    pub file_logs: bool,

    /// Root for instance directories; defaults to `<base>/servers`
    #[serde(default)]
    pub server_root: Option<PathBuf>,

    /// Local HTTP server
    #[serde(default)]
    pub server: HttpSettings,

    /// Provisioning worker pool size
    #[serde(default = "default_workers")]
    pub provisioning_workers: usize,

    /// Process supervision and bootstrap timings
    #[serde(default)]
    pub timings: TimingSettings,

    /// Executable used to launch artifacts
    #[serde(default = "default_java_bin")]
    pub java_bin: String,
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    3
}

fn default_java_bin() -> String {
    "java".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            file_logs: true,
            server_root: None,
            server: HttpSettings::default(),
            provisioning_workers: default_workers(),
            timings: TimingSettings::default(),
            java_bin: default_java_bin(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when absent
    pub async fn load_or_default(file: &File) -> Result<Self, ManagerError> {
        if !file.exists().await {
            info!(
                "No settings file at {}, using defaults",
                file.path().display()
            );
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Worker pool size clamped to the supported range
    pub fn worker_count(&self) -> usize {
        self.provisioning_workers.clamp(1, 6)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8470
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Timeouts and poll intervals, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default = "default_stop_poll_ms")]
    pub stop_poll_ms: u64,

    #[serde(default = "default_bootstrap_timeout_ms")]
    pub bootstrap_timeout_ms: u64,

    #[serde(default = "default_bootstrap_poll_ms")]
    pub bootstrap_poll_ms: u64,

    #[serde(default = "default_rcon_connect_timeout_ms")]
    pub rcon_connect_timeout_ms: u64,
}

fn default_stop_timeout_ms() -> u64 {
    30_000
}

fn default_stop_poll_ms() -> u64 {
    1_000
}

fn default_bootstrap_timeout_ms() -> u64 {
    60_000
}

fn default_bootstrap_poll_ms() -> u64 {
    500
}

fn default_rcon_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            stop_poll_ms: default_stop_poll_ms(),
            bootstrap_timeout_ms: default_bootstrap_timeout_ms(),
            bootstrap_poll_ms: default_bootstrap_poll_ms(),
            rcon_connect_timeout_ms: default_rcon_connect_timeout_ms(),
        }
    }
}
