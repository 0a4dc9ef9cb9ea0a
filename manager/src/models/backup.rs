//! Backup records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::ServerInstance;
use super::user::User;
use crate::store::{Column, ColumnKind, Record, Schema, Value};

/// A snapshot of an instance directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: Uuid,
    pub server_instance_id: Uuid,
    pub created_by: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl Backup {
    pub fn new(server_instance_id: Uuid, created_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            server_instance_id,
            created_by,
            timestamp: Utc::now(),
        }
    }
}

impl Record for Backup {
    const SCHEMA: Schema = Schema {
        table: "backups",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnKind::Uuid),
            Column::new("server_instance_id", ColumnKind::Uuid),
            Column::new("created_by", ColumnKind::Uuid),
            Column::new("timestamp", ColumnKind::Timestamp),
        ],
    };

    fn id(&self) -> Uuid {
        self.id
    }

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "server_instance_id" => self.server_instance_id.into(),
            "created_by" => self.created_by.into(),
            "timestamp" => self.timestamp.into(),
            _ => return None,
        })
    }
}

/// Contents of a snapshot's metadata file.
///
/// Carries the instance and creator as they were at snapshot time so a
/// restore can upsert them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup: Backup,
    pub instance: ServerInstance,
    pub created_by: User,
}
