//! Persisted domain records

pub mod backup;
pub mod instance;
pub mod property;
pub mod user;

pub use backup::{Backup, BackupManifest};
pub use instance::{NewServerInstance, ServerInstance};
pub use property::{PropertyType, ServerInstanceProperty};
pub use user::User;
