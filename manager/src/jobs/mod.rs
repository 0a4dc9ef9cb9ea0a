//! Tracking of asynchronous provisioning runs

pub mod registry;

pub use registry::{Job, JobRegistry, JobState, JobStatus, LogEntry};
