//! Record persistence
//!
//! Each persisted type declares its table layout statically through
//! [`Record::SCHEMA`] and exposes its column values through
//! [`Record::column`]. Repositories filter and order on those values.

pub mod json;
pub mod memory;
pub mod schema;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::errors::ManagerError;

pub use json::JsonFileRepository;
pub use memory::MemoryRepository;
pub use schema::{Column, ColumnKind, Schema};

/// A column value used for filtering and ordering
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Null,
    Uuid(Uuid),
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A persisted record type
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Static table description
    const SCHEMA: Schema;

    /// Primary key
    fn id(&self) -> Uuid;

    /// Value of the named column, `None` for unknown columns
    fn column(&self, name: &str) -> Option<Value>;
}

/// Equality filter on a column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    fn matches<T: Record>(&self, record: &T) -> bool {
        record.column(self.column).as_ref() == Some(&self.value)
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Apply filters and ordering to an in-memory set of records
pub(crate) fn select<T: Record>(
    records: impl IntoIterator<Item = T>,
    filters: &[Filter],
    order_by: Option<OrderBy>,
) -> Result<Vec<T>, ManagerError> {
    for filter in filters {
        check_column::<T>(filter.column)?;
    }

    let mut selected: Vec<T> = records
        .into_iter()
        .filter(|r| filters.iter().all(|f| f.matches(r)))
        .collect();

    if let Some(order) = order_by {
        check_column::<T>(order.column)?;
        selected.sort_by(|a, b| {
            let ordering = a
                .column(order.column)
                .partial_cmp(&b.column(order.column))
                .unwrap_or(Ordering::Equal);
            if order.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    Ok(selected)
}

fn check_column<T: Record>(column: &str) -> Result<(), ManagerError> {
    if T::SCHEMA.column(column).is_none() {
        return Err(ManagerError::PersistenceError(format!(
            "Unknown column {}.{}",
            T::SCHEMA.table,
            column
        )));
    }
    Ok(())
}

/// Typed access to one table
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Fetch a record by primary key
    async fn get(&self, id: Uuid) -> Result<Option<T>, ManagerError>;

    /// Insert a new record, failing if the key is taken
    async fn add(&self, record: &T) -> Result<(), ManagerError>;

    /// Replace an existing record, failing if absent
    async fn update(&self, record: &T) -> Result<(), ManagerError>;

    /// Remove a record; absence is not an error
    async fn delete(&self, id: Uuid) -> Result<(), ManagerError>;

    /// Records matching every filter, optionally ordered
    async fn query(&self, filters: &[Filter], order_by: Option<OrderBy>)
        -> Result<Vec<T>, ManagerError>;

    async fn exists(&self, id: Uuid) -> Result<bool, ManagerError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Update if present, insert otherwise
    async fn upsert(&self, record: &T) -> Result<(), ManagerError> {
        if self.exists(record.id()).await? {
            self.update(record).await
        } else {
            self.add(record).await
        }
    }
}

/// Query expecting at most one match
pub async fn query_unique<T: Record>(
    repo: &dyn Repository<T>,
    filters: &[Filter],
) -> Result<Option<T>, ManagerError> {
    let mut found = repo.query(filters, None).await?;
    if found.len() > 1 {
        return Err(ManagerError::PersistenceError(format!(
            "Expected a unique {} record, found {}",
            T::SCHEMA.table,
            found.len()
        )));
    }
    Ok(found.pop())
}
