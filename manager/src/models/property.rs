//! Runtime configuration entries of an instance

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Column, ColumnKind, Record, Schema, Value};

/// Inferred type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Boolean,
    Integer,
    String,
}

impl PropertyType {
    /// `true`/`false` in any case is a boolean, anything `i32` accepts is an
    /// integer, everything else is a string.
    pub fn infer(value: &str) -> Self {
        if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            PropertyType::Boolean
        } else if value.parse::<i32>().is_ok() {
            PropertyType::Integer
        } else {
            PropertyType::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Boolean => "boolean",
            PropertyType::Integer => "integer",
            PropertyType::String => "string",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `key=value` entry of an instance's configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstanceProperty {
    pub id: Uuid,
    pub server_instance_id: Uuid,
    /// Reserved keys are hidden from callers and managed by the system
    pub hidden: bool,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub value: String,
    pub key: String,
}

impl ServerInstanceProperty {
    /// New visible property with its type inferred from `value`
    pub fn new(server_instance_id: Uuid, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            id: Uuid::new_v4(),
            server_instance_id,
            hidden: false,
            property_type: PropertyType::infer(&value),
            value,
            key: key.into(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Replace the value and re-infer its type
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.property_type = PropertyType::infer(&self.value);
    }
}

impl Record for ServerInstanceProperty {
    const SCHEMA: Schema = Schema {
        table: "server_instance_properties",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnKind::Uuid),
            Column::new("server_instance_id", ColumnKind::Uuid),
            Column::new("hidden", ColumnKind::Boolean),
            Column::new("type", ColumnKind::Text),
            Column::new("value", ColumnKind::Text),
            Column::new("key", ColumnKind::Text),
        ],
    };

    fn id(&self) -> Uuid {
        self.id
    }

    fn column(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.into(),
            "server_instance_id" => self.server_instance_id.into(),
            "hidden" => self.hidden.into(),
            "type" => self.property_type.as_str().into(),
            "value" => self.value.clone().into(),
            "key" => self.key.clone().into(),
            _ => return None,
        })
    }
}
