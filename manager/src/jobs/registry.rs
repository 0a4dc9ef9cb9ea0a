//! In-memory job registry

use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Success,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub message: String,
}

/// Point-in-time copy of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub state: JobState,
    pub logs: Vec<LogEntry>,
}

/// A tracked provisioning run.
///
/// Only the worker owning the job writes to it; pollers read snapshots.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    state: RwLock<JobState>,
    logs: RwLock<Vec<LogEntry>>,
}

impl Job {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RwLock::new(JobState::Running),
            logs: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a progress line
    pub fn log(&self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now().timestamp_millis(),
            message: message.into(),
        };
        debug!("job {}: {}", self.id, entry.message);
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        logs.push(entry);
    }

    /// Move a running job to a terminal state.
    ///
    /// Returns false (and changes nothing) if the job already finished or
    /// `state` is not terminal.
    pub fn finish(&self, state: JobState) -> bool {
        if !state.is_terminal() {
            return false;
        }
        let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
        if current.is_terminal() {
            return false;
        }
        *current = state;
        true
    }

    pub fn snapshot(&self) -> JobStatus {
        // state first: a terminal state is never paired with a log missing
        // the final entry
        let state = self.state();
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner()).clone();
        JobStatus {
            id: self.id,
            state,
            logs,
        }
    }
}

/// Process-wide table of jobs, cleared on restart
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running job with an empty log
    pub fn create(&self) -> Arc<Job> {
        let job = Arc::new(Job::new(Uuid::new_v4()));
        self.jobs.insert(job.id(), job.clone());
        job
    }

    /// Handle to a job for its owning worker
    pub fn job(&self, id: Uuid) -> Option<Arc<Job>> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    /// Snapshot of a job; `None` for unknown ids
    pub fn get(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.get(&id).map(|job| job.snapshot())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_running_and_empty() {
        let registry = JobRegistry::new();
        let job = registry.create();

        let status = registry.get(job.id()).unwrap();
        assert_eq!(status.state, JobState::Running);
        assert!(status.logs.is_empty());
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_state_is_forward_only() {
        let registry = JobRegistry::new();
        let job = registry.create();

        assert!(!job.finish(JobState::Running));
        assert!(job.finish(JobState::Error));
        assert!(!job.finish(JobState::Success));
        assert_eq!(job.state(), JobState::Error);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = JobRegistry::new();
        let job = registry.create();
        job.log("Creating server directory");

        let before = registry.get(job.id()).unwrap();
        job.log("Downloading");
        job.finish(JobState::Success);

        assert_eq!(before.logs.len(), 1);
        assert_eq!(before.state, JobState::Running);
        let after = registry.get(job.id()).unwrap();
        assert_eq!(after.logs.len(), 2);
        assert_eq!(after.state, JobState::Success);
    }

    #[tokio::test]
    async fn test_concurrent_append_and_read() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create();
        let id = job.id();

        let writer = tokio::spawn(async move {
            for i in 0..500 {
                job.log(format!("line {}", i));
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            job.finish(JobState::Success);
        });

        let reader_registry = registry.clone();
        let reader = tokio::spawn(async move {
            let mut last_len = 0;
            loop {
                let status = reader_registry.get(id).unwrap();
                assert!(status.logs.len() >= last_len);
                for (i, entry) in status.logs.iter().enumerate() {
                    assert_eq!(entry.message, format!("line {}", i));
                }
                last_len = status.logs.len();
                if status.state.is_terminal() {
                    return last_len;
                }
                tokio::task::yield_now().await;
            }
        });

        writer.await.unwrap();
        assert_eq!(reader.await.unwrap(), 500);
    }
}
