//! Utility functions

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::errors::ManagerError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Version information for the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Run `program` with `args` and return the first line it printed
pub async fn query_program(program: &str, args: &[&str]) -> Result<String, ManagerError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ManagerError::EnvironmentInvalid(format!("{}: {}", program, e)))?;
    if !output.status.success() {
        return Err(ManagerError::EnvironmentInvalid(format!(
            "{} exited with {}",
            program, output.status
        )));
    }

    // java prints its version on stderr
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first_line = stdout
        .lines()
        .chain(stderr.lines())
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    Ok(first_line.trim().to_string())
}

/// Print what the manager needs from the host
pub async fn run_diagnostic(layout: &StorageLayout) {
    let version = version_info();
    println!("gsmgr {} ({}, built {})", version.version, version.git_hash, version.build_time);
    println!("base directory: {}", layout.base_dir.display());

    let settings = match Settings::load_or_default(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            println!("settings: unreadable ({})", e);
            Settings::default()
        }
    };
    let server_root = settings
        .server_root
        .clone()
        .unwrap_or_else(|| layout.server_root.clone());
    println!("server root: {}", server_root.display());

    for (program, args) in [
        ("tmux", vec!["-V"]),
        (settings.java_bin.as_str(), vec!["-version"]),
    ] {
        match query_program(program, &args).await {
            Ok(version) => println!("{}: ok ({})", program, version),
            Err(e) => println!("{}: missing ({})", program, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let version = version_info();
        assert_eq!(version.version, env!("CARGO_PKG_VERSION"));
        assert!(!version.git_hash.is_empty());
    }

    #[tokio::test]
    async fn test_query_program() {
        let line = query_program("sh", &["-c", "echo; echo 'v1.2' >&2"]).await.unwrap();
        assert_eq!(line, "v1.2");

        let err = query_program("sh", &["-c", "exit 3"]).await.unwrap_err();
        assert!(matches!(err, ManagerError::EnvironmentInvalid(_)));

        let err = query_program("gsmgr-no-such-program", &[]).await.unwrap_err();
        assert!(matches!(err, ManagerError::EnvironmentInvalid(_)));
    }
}
