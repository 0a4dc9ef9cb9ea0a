//! Per-instance RCON client cache

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::SecretString;
use tracing::debug;
use uuid::Uuid;

use super::client::RconClient;
use crate::errors::ManagerError;
use crate::models::{ServerInstance, ServerInstanceProperty};
use crate::properties::{RCON_PASSWORD_KEY, RCON_PORT_KEY};
use crate::store::{Filter, Repository};

/// Clients are built lazily from the instance's stored RCON properties and
/// kept for the lifetime of the cache.
pub struct RconClients {
    clients: DashMap<Uuid, Arc<RconClient>>,
    properties: Arc<dyn Repository<ServerInstanceProperty>>,
    host: String,
    connect_timeout: Duration,
}

impl RconClients {
    pub fn new(
        properties: Arc<dyn Repository<ServerInstanceProperty>>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            clients: DashMap::new(),
            properties,
            host: "127.0.0.1".to_string(),
            connect_timeout,
        }
    }

    /// Client for `instance`, which must be provisioned
    pub async fn client(&self, instance: &ServerInstance) -> Result<Arc<RconClient>, ManagerError> {
        if let Some(client) = self.clients.get(&instance.id()) {
            return Ok(client.clone());
        }
        if !instance.license_accepted() {
            return Err(ManagerError::Conflict(format!(
                "Server instance {} is not provisioned",
                instance.id()
            )));
        }

        let properties = self
            .properties
            .query(&[Filter::eq("server_instance_id", instance.id())], None)
            .await?;
        let lookup = |key: &str| {
            properties
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.value.clone())
                .ok_or_else(|| {
                    ManagerError::ConfigError(format!(
                        "Server instance {} has no {} property",
                        instance.id(),
                        key
                    ))
                })
        };
        let port: u16 = lookup(RCON_PORT_KEY)?.parse().map_err(|_| {
            ManagerError::ConfigError(format!(
                "Server instance {} has an invalid {} property",
                instance.id(),
                RCON_PORT_KEY
            ))
        })?;
        let password = SecretString::from(lookup(RCON_PASSWORD_KEY)?);

        let client = Arc::new(RconClient::new(
            self.host.clone(),
            port,
            password,
            self.connect_timeout,
        ));
        // concurrent first lookups keep whichever client was inserted first
        let entry = self.clients.entry(instance.id()).or_insert(client);
        debug!("Cached RCON client for {} on port {}", instance.id(), port);
        Ok(entry.value().clone())
    }

    /// Send `command` to the instance and return its output
    pub async fn send_command(
        &self,
        instance: &ServerInstance,
        command: &str,
    ) -> Result<String, ManagerError> {
        self.client(instance).await?.send_command(command).await
    }

    /// Drop the cached client, e.g. after the instance's ports changed
    pub fn evict(&self, instance_id: Uuid) {
        self.clients.remove(&instance_id);
    }
}
