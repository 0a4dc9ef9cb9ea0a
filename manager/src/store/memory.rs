//! In-memory repository

use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{select, Filter, OrderBy, Record, Repository};
use crate::errors::ManagerError;

/// Repository keeping records in insertion order in memory
pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn get(&self, id: Uuid) -> Result<Option<T>, ManagerError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    async fn add(&self, record: &T) -> Result<(), ManagerError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(ManagerError::PersistenceError(format!(
                "Duplicate key {} in {}",
                record.id(),
                T::SCHEMA.table
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &T) -> Result<(), ManagerError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(ManagerError::NotFound(format!(
                "{} {}",
                T::SCHEMA.table,
                record.id()
            ))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), ManagerError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.retain(|r| r.id() != id);
        Ok(())
    }

    async fn query(
        &self,
        filters: &[Filter],
        order_by: Option<OrderBy>,
    ) -> Result<Vec<T>, ManagerError> {
        let snapshot = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            records.clone()
        };
        select(snapshot, filters, order_by)
    }
}
