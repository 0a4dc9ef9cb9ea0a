//! Game server manager library
//!
//! Provisioning, process supervision, remote console access, properties and
//! backups for locally hosted game server instances.

pub mod app;
pub mod backup;
pub mod errors;
pub mod filesys;
pub mod jobs;
pub mod logs;
pub mod models;
pub mod properties;
pub mod provision;
pub mod rcon;
pub mod server;
pub mod services;
pub mod storage;
pub mod store;
pub mod supervisor;
pub mod utils;
pub mod workers;
