//! Operations exposed to the HTTP surface

pub mod backups;
pub mod instances;
pub mod users;

use std::sync::Arc;

use crate::filesys::dir::Dir;
use crate::models::{Backup, ServerInstance, ServerInstanceProperty, User};
use crate::store::{JsonFileRepository, MemoryRepository, Repository};

pub use backups::BackupService;
pub use instances::InstanceService;
pub use users::UserService;

/// One repository per record type
#[derive(Clone)]
pub struct Repositories {
    pub instances: Arc<dyn Repository<ServerInstance>>,
    pub properties: Arc<dyn Repository<ServerInstanceProperty>>,
    pub backups: Arc<dyn Repository<Backup>>,
    pub users: Arc<dyn Repository<User>>,
}

impl Repositories {
    /// Repositories persisted as JSON files under `data_dir`
    pub fn json(data_dir: &Dir) -> Self {
        Self {
            instances: Arc::new(JsonFileRepository::<ServerInstance>::new(data_dir)),
            properties: Arc::new(JsonFileRepository::<ServerInstanceProperty>::new(data_dir)),
            backups: Arc::new(JsonFileRepository::<Backup>::new(data_dir)),
            users: Arc::new(JsonFileRepository::<User>::new(data_dir)),
        }
    }

    pub fn memory() -> Self {
        Self {
            instances: Arc::new(MemoryRepository::<ServerInstance>::new()),
            properties: Arc::new(MemoryRepository::<ServerInstanceProperty>::new()),
            backups: Arc::new(MemoryRepository::<Backup>::new()),
            users: Arc::new(MemoryRepository::<User>::new()),
        }
    }
}
