//! RCON client
//!
//! Every command opens its own connection, authenticates, sends the command
//! and reads a single response.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tracing::debug;

use super::packet::{Packet, AUTH_FAILURE_ID, PACKET_TYPE_AUTH, PACKET_TYPE_COMMAND};
use crate::errors::ManagerError;

pub struct RconClient {
    host: String,
    port: u16,
    password: SecretString,
    connect_timeout: Duration,
    request_id: AtomicI32,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl RconClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: SecretString,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password,
            connect_timeout,
            request_id: AtomicI32::new(0),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    // Wraps at i32::MAX; ids only need to be unique within one connection.
    fn next_id(&self) -> i32 {
        self.request_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    async fn connect(&self) -> Result<TcpStream, ManagerError> {
        let address = (self.host.as_str(), self.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ManagerError::CommunicationFailed(e)),
            Err(_) => Err(ManagerError::CommunicationFailed(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connecting to {}:{} timed out", self.host, self.port),
            ))),
        }
    }

    /// Run `command` on the server and return its output
    pub async fn send_command(&self, command: &str) -> Result<String, ManagerError> {
        let mut stream = self.connect().await?;

        let auth = Packet::new(
            self.next_id(),
            PACKET_TYPE_AUTH,
            self.password.expose_secret().as_bytes(),
        );
        auth.write_to(&mut stream)
            .await
            .map_err(ManagerError::CommunicationFailed)?;
        let response = Packet::read_from(&mut stream)
            .await
            .map_err(ManagerError::CommunicationFailed)?;
        if response.id == AUTH_FAILURE_ID {
            return Err(ManagerError::AuthenticationFailed);
        }

        debug!("RCON {}:{} > {}", self.host, self.port, command);
        let request = Packet::new(self.next_id(), PACKET_TYPE_COMMAND, command.as_bytes());
        request
            .write_to(&mut stream)
            .await
            .map_err(ManagerError::CommunicationFailed)?;
        let response = Packet::read_from(&mut stream)
            .await
            .map_err(ManagerError::CommunicationFailed)?;

        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn client(port: u16, password: &str) -> RconClient {
        RconClient::new(
            "127.0.0.1",
            port,
            SecretString::from(password.to_string()),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_command_output_from_hand_built_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let auth = Packet::read_from(&mut socket).await.unwrap();
            assert_eq!(auth.kind, PACKET_TYPE_AUTH);
            assert_eq!(auth.text(), "hunter2");
            socket
                .write_all(&Packet::new(auth.id, 2, "").encode())
                .await
                .unwrap();

            let command = Packet::read_from(&mut socket).await.unwrap();
            assert_eq!(command.kind, PACKET_TYPE_COMMAND);
            assert_ne!(command.id, auth.id);

            // extra padding beyond the protocol's two NULs
            let mut body = b"There are 2 of a max of 20 players online".to_vec();
            body.extend_from_slice(&[0, 0]);
            socket
                .write_all(&Packet::new(command.id, 0, body).encode())
                .await
                .unwrap();
            command.text()
        });

        let output = client(port, "hunter2").send_command("list").await.unwrap();
        assert_eq!(output, "There are 2 of a max of 20 players online");
        assert_eq!(server.await.unwrap(), "list");
    }

    #[tokio::test]
    async fn test_auth_rejected_sends_no_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _auth = Packet::read_from(&mut socket).await.unwrap();
            socket
                .write_all(&Packet::new(AUTH_FAILURE_ID, 2, "").encode())
                .await
                .unwrap();
            // the client must hang up instead of sending a command
            Packet::read_from(&mut socket).await.is_ok()
        });

        let err = client(port, "wrong").send_command("stop").await.unwrap_err();
        assert!(matches!(err, ManagerError::AuthenticationFailed));
        assert!(!server.await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_refused_is_communication_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client(port, "x").send_command("list").await.unwrap_err();
        assert!(matches!(err, ManagerError::CommunicationFailed(_)));
    }

    #[test]
    fn test_request_ids_increase_and_wrap() {
        let client = client(1, "x");
        assert_eq!(client.next_id(), 1);
        assert_eq!(client.next_id(), 2);

        client.request_id.store(i32::MAX, Ordering::Relaxed);
        assert_eq!(client.next_id(), i32::MIN);
    }
}
