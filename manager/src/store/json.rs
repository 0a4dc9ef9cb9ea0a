//! JSON file backed repository
//!
//! Each table lives in `<data_dir>/<table>.json` as a JSON array. Every
//! mutation rewrites the file atomically while holding the table lock.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{select, Filter, OrderBy, Record, Repository};
use crate::errors::ManagerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

pub struct JsonFileRepository<T> {
    file: File,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> JsonFileRepository<T> {
    pub fn new(data_dir: &Dir) -> Self {
        Self {
            file: data_dir.file(&format!("{}.json", T::SCHEMA.table)),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    async fn load(&self) -> Result<Vec<T>, ManagerError> {
        if !self.file.exists().await {
            return Ok(Vec::new());
        }
        self.file.read_json().await
    }

    async fn save(&self, records: &[T]) -> Result<(), ManagerError> {
        let contents = serde_json::to_vec_pretty(records)?;
        self.file.write_atomic(&contents).await?;
        debug!(
            "Saved {} records to {}",
            records.len(),
            self.file.path().display()
        );
        Ok(())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for JsonFileRepository<T> {
    async fn get(&self, id: Uuid) -> Result<Option<T>, ManagerError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().find(|r| r.id() == id))
    }

    async fn add(&self, record: &T) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(ManagerError::PersistenceError(format!(
                "Duplicate key {} in {}",
                record.id(),
                T::SCHEMA.table
            )));
        }
        records.push(record.clone());
        self.save(&records).await
    }

    async fn update(&self, record: &T) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record.clone(),
            None => {
                return Err(ManagerError::NotFound(format!(
                    "{} {}",
                    T::SCHEMA.table,
                    record.id()
                )))
            }
        }
        self.save(&records).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), ManagerError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() != before {
            self.save(&records).await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        filters: &[Filter],
        order_by: Option<OrderBy>,
    ) -> Result<Vec<T>, ManagerError> {
        let records = {
            let _guard = self.lock.lock().await;
            self.load().await?
        };
        select(records, filters, order_by)
    }
}
