//! Server state

use std::sync::Arc;

use crate::services::{BackupService, InstanceService, UserService};

/// Server state shared across handlers
pub struct ServerState {
    pub instances: Arc<InstanceService>,
    pub backups: Arc<BackupService>,
    pub users: Arc<UserService>,
}

impl ServerState {
    pub fn new(
        instances: Arc<InstanceService>,
        backups: Arc<BackupService>,
        users: Arc<UserService>,
    ) -> Self {
        Self {
            instances,
            backups,
            users,
        }
    }
}
