//! Server instance record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::store::{Column, ColumnKind, Record, Schema, Value};

/// Lowest port accepted, exclusive
pub const PORT_MIN_EXCLUSIVE: u16 = 1023;

/// Highest port accepted, exclusive
pub const PORT_MAX_EXCLUSIVE: u16 = 65535;

/// Fields supplied by a caller creating an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServerInstance {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub target_version: String,
    pub artifact_url: String,
    pub allocated_ram_mb: u32,
    pub port: u16,
}

/// One managed game server.
///
/// The game port must be even; `port + 1` is reserved for the remote
/// console. `license_accepted` only ever flips to true through
/// provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ServerInstanceData")]
pub struct ServerInstance {
    id: Uuid,
    name: String,
    description: Option<String>,
    target_version: String,
    artifact_url: String,
    license_accepted: bool,
    created_at: DateTime<Utc>,
    allocated_ram_mb: u32,
    port: u16,
}

/// Unvalidated wire form
#[derive(Deserialize)]
struct ServerInstanceData {
    id: Uuid,
    name: String,
    #[serde(default)]
    description: Option<String>,
    target_version: String,
    artifact_url: String,
    license_accepted: bool,
    created_at: DateTime<Utc>,
    allocated_ram_mb: u32,
    port: u16,
}

impl TryFrom<ServerInstanceData> for ServerInstance {
    type Error = ManagerError;

    fn try_from(data: ServerInstanceData) -> Result<Self, Self::Error> {
        let mut instance = ServerInstance::new(NewServerInstance {
            name: data.name,
            description: data.description,
            target_version: data.target_version,
            artifact_url: data.artifact_url,
            allocated_ram_mb: data.allocated_ram_mb,
            port: data.port,
        })?;
        instance.id = data.id;
        instance.created_at = data.created_at;
        instance.license_accepted = data.license_accepted;
        Ok(instance)
    }
}

impl ServerInstance {
    /// Create an unprovisioned instance with a fresh id
    pub fn new(new: NewServerInstance) -> Result<Self, ManagerError> {
        if new.target_version.trim().is_empty() {
            return Err(ManagerError::ValidationError(
                "Target version cannot be empty".to_string(),
            ));
        }
        validate_artifact_url(&new.artifact_url)?;

        let mut instance = Self {
            id: Uuid::new_v4(),
            name: String::new(),
            description: None,
            target_version: new.target_version,
            artifact_url: new.artifact_url,
            license_accepted: false,
            created_at: Utc::now(),
            allocated_ram_mb: 0,
            port: 0,
        };
        instance.set_name(new.name)?;
        instance.set_description(new.description);
        instance.set_allocated_ram_mb(new.allocated_ram_mb)?;
        instance.set_port(new.port)?;
        Ok(instance)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) -> Result<(), ManagerError> {
        if name.trim().is_empty() {
            return Err(ManagerError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }
        self.name = name;
        Ok(())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn target_version(&self) -> &str {
        &self.target_version
    }

    pub fn artifact_url(&self) -> &str {
        &self.artifact_url
    }

    pub fn license_accepted(&self) -> bool {
        self.license_accepted
    }

    /// Mark the instance provisioned
    pub(crate) fn accept_license(&mut self) {
        self.license_accepted = true;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn allocated_ram_mb(&self) -> u32 {
        self.allocated_ram_mb
    }

    pub fn set_allocated_ram_mb(&mut self, allocated_ram_mb: u32) -> Result<(), ManagerError> {
        if allocated_ram_mb == 0 {
            return Err(ManagerError::ValidationError(
                "Allocated RAM must be positive".to_string(),
            ));
        }
        self.allocated_ram_mb = allocated_ram_mb;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ManagerError> {
        if port <= PORT_MIN_EXCLUSIVE || port >= PORT_MAX_EXCLUSIVE {
            return Err(ManagerError::ValidationError(format!(
                "Port must be between {} and {} (exclusive)",
                PORT_MIN_EXCLUSIVE, PORT_MAX_EXCLUSIVE
            )));
        }
        if port % 2 != 0 {
            return Err(ManagerError::ValidationError(
                "Port must be even; the following odd port is reserved for RCON".to_string(),
            ));
        }
        self.port = port;
        Ok(())
    }

    /// Port of the remote console
    pub fn rcon_port(&self) -> u16 {
        self.port + 1
    }
}

fn validate_artifact_url(artifact_url: &str) -> Result<(), ManagerError> {
    if artifact_url.trim().is_empty() {
        return Err(ManagerError::ValidationError(
            "Artifact URL cannot be empty".to_string(),
        ));
    }
    let url = Url::parse(artifact_url)
        .map_err(|e| ManagerError::ValidationError(format!("Invalid artifact URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ManagerError::ValidationError(format!(
            "Unsupported artifact URL scheme: {}",
            url.scheme()
        )));
    }
    Ok(())
}

impl Record for ServerInstance {
    const SCHEMA: Schema = Schema {
        table: "server_instances",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnKind::Uuid),
            Column::new("name", ColumnKind::Text),
            Column::nullable("description", ColumnKind::Text),
            Column::new("target_version", ColumnKind::Text),
            Column::new("artifact_url", ColumnKind::Text),
            Column::new("license_accepted", ColumnKind::Boolean),
            Column::new("created_at", ColumnKind::Timestamp),
            Column::new("allocated_ram_mb", ColumnKind::Integer),
            Column::new("port", ColumnKind::Integer),
        ],
    };

    fn id(&self) -> Uuid {
        self.id
    }

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            "description" => self.description.clone().into(),
            "target_version" => self.target_version.clone().into(),
            "artifact_url" => self.artifact_url.clone().into(),
            "license_accepted" => self.license_accepted.into(),
            "created_at" => self.created_at.into(),
            "allocated_ram_mb" => i64::from(self.allocated_ram_mb).into(),
            "port" => i64::from(self.port).into(),
            _ => return None,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample(port: u16) -> ServerInstance {
    ServerInstance::new(NewServerInstance {
        name: format!("survival-{}", port),
        description: Some("test world".to_string()),
        target_version: "1.21.1".to_string(),
        artifact_url: "https://example.com/server.jar".to_string(),
        allocated_ram_mb: 2048,
        port,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::check_conformance;

    #[test]
    fn test_port_rules() {
        let mut instance = sample(25564);
        assert_eq!(instance.rcon_port(), 25565);

        assert!(instance.set_port(25565).is_err());
        assert!(instance.set_port(1022).is_err());
        assert!(instance.set_port(1023).is_err());
        assert!(instance.set_port(1024).is_ok());
        assert!(instance.set_port(65534).is_ok());
        assert!(instance.set_port(65535).is_err());
    }

    #[test]
    fn test_new_rejects_invalid_fields() {
        let base = NewServerInstance {
            name: "a".to_string(),
            description: None,
            target_version: "1.20".to_string(),
            artifact_url: "https://example.com/server.jar".to_string(),
            allocated_ram_mb: 1024,
            port: 25564,
        };

        assert!(ServerInstance::new(NewServerInstance { port: 25563, ..base.clone() }).is_err());
        assert!(ServerInstance::new(NewServerInstance { name: " ".into(), ..base.clone() }).is_err());
        assert!(ServerInstance::new(NewServerInstance { artifact_url: "".into(), ..base.clone() }).is_err());
        assert!(ServerInstance::new(NewServerInstance { target_version: "".into(), ..base.clone() }).is_err());
        assert!(ServerInstance::new(NewServerInstance { allocated_ram_mb: 0, ..base.clone() }).is_err());

        let instance = ServerInstance::new(base).unwrap();
        assert!(!instance.license_accepted());
    }

    #[test]
    fn test_deserialize_validates() {
        let instance = sample(25564);
        let mut json = serde_json::to_value(&instance).unwrap();

        let parsed: ServerInstance = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed, instance);

        json["port"] = serde_json::json!(25565);
        assert!(serde_json::from_value::<ServerInstance>(json).is_err());
    }

    #[test]
    fn test_schema_conformance() {
        check_conformance(&sample(25564)).unwrap();
        let mut no_description = sample(25566);
        no_description.set_description(None);
        check_conformance(&no_description).unwrap();
    }
}
