//! Instance provisioning

pub mod bootstrap;
pub mod pipeline;

pub use bootstrap::BootstrapCommand;
pub use pipeline::{ProvisionOptions, Provisioner};

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    use super::{BootstrapCommand, ProvisionOptions};

    /// Stand-in for the game server: writes the license file on the first
    /// run and the configuration file once the license is accepted.
    pub(crate) const FAKE_SERVER: &str = "if grep -q eula=true eula.txt 2>/dev/null; then \
        printf 'motd=hello\\nserver-port=9999\\nmax-players=20\\n' > server.properties; \
        else echo eula=false > eula.txt; fi; exec sleep 30";

    /// Serve `fake jar bytes` at `/server.jar`; returns the base URL
    pub(crate) async fn artifact_server() -> String {
        let app = Router::new().route("/server.jar", get(|| async { &b"fake jar bytes"[..] }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub(crate) fn sh_options(script: &str, timeout: Duration) -> ProvisionOptions {
        ProvisionOptions {
            bootstrap: BootstrapCommand {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
            },
            bootstrap_timeout: timeout,
            config_timeout: timeout,
            poll_interval: Duration::from_millis(20),
        }
    }
}
