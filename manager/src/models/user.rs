use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Column, ColumnKind, Record, Schema, Value};

/// An actor recorded on backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
        }
    }
}

impl Record for User {
    const SCHEMA: Schema = Schema {
        table: "users",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnKind::Uuid),
            Column::new("username", ColumnKind::Text),
        ],
    };

    fn id(&self) -> Uuid {
        self.id
    }

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "username" => self.username.clone().into(),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::check_conformance;

    #[test]
    fn test_schema_conformance() {
        check_conformance(&User::new("alex")).unwrap();
    }
}
