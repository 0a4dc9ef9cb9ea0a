//! Static table descriptions and their conformance check

use std::collections::HashSet;

use super::{Record, Value};

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Integer,
    Boolean,
    Timestamp,
}

/// One column of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// Table name, primary key and columns of a record type
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub table: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [Column],
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn kind_matches(kind: ColumnKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (_, Value::Null)
            | (ColumnKind::Uuid, Value::Uuid(_))
            | (ColumnKind::Text, Value::Text(_))
            | (ColumnKind::Integer, Value::Integer(_))
            | (ColumnKind::Boolean, Value::Boolean(_))
            | (ColumnKind::Timestamp, Value::Timestamp(_))
    )
}

/// Verify that `T`'s declared schema agrees with what its records expose.
///
/// Returns every violation found so a failing test lists them all.
pub fn check_conformance<T: Record>(sample: &T) -> Result<(), Vec<String>> {
    let schema = T::SCHEMA;
    let mut problems = Vec::new();

    if schema.table.is_empty() {
        problems.push("table name is empty".to_string());
    }

    let mut seen = HashSet::new();
    for column in schema.columns {
        if !seen.insert(column.name) {
            problems.push(format!("duplicate column {}", column.name));
        }

        match sample.column(column.name) {
            None => problems.push(format!("column {} is not exposed by the record", column.name)),
            Some(Value::Null) if !column.nullable => {
                problems.push(format!("non-nullable column {} is null", column.name))
            }
            Some(value) if !kind_matches(column.kind, &value) => problems.push(format!(
                "column {} declared {:?} but holds {:?}",
                column.name, column.kind, value
            )),
            Some(_) => {}
        }
    }

    match schema.column(schema.primary_key) {
        None => problems.push(format!("primary key {} is not a column", schema.primary_key)),
        Some(pk) if pk.nullable => {
            problems.push(format!("primary key {} is nullable", schema.primary_key))
        }
        Some(_) => {
            if sample.column(schema.primary_key) != Some(Value::Uuid(sample.id())) {
                problems.push("primary key column does not match id()".to_string());
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
