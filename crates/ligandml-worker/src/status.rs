//! Shared worker status, read by the HTTP surface.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ligandml_common::JobKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Connecting,
    Idle,
    Busy,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub current_job: Option<i64>,
    pub last_loaded_job: Option<i64>,
    pub trained: u64,
    pub inferred: u64,
    pub malformed: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            state: WorkerState::Connecting,
            current_job: None,
            last_loaded_job: None,
            trained: 0,
            inferred: 0,
            malformed: 0,
            failed: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Cloneable handle onto one [`WorkerStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<WorkerStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WorkerStatus {
        self.read().clone()
    }

    pub fn set_state(&self, state: WorkerState) {
        let mut status = self.write();
        status.state = state;
        status.updated_at = Utc::now();
    }

    pub fn begin_job(&self, job_id: i64) {
        let mut status = self.write();
        status.state = WorkerState::Busy;
        status.current_job = Some(job_id);
        status.updated_at = Utc::now();
    }

    /// Close out the current job. Failed jobs count toward `failed` only.
    pub fn finish_job(&self, kind: JobKind, error: Option<String>) {
        let mut status = self.write();
        status.last_loaded_job = status.current_job.take();
        match error {
            Some(e) => {
                status.failed += 1;
                status.last_error = Some(e);
            }
            None => match kind {
                JobKind::Train => status.trained += 1,
                JobKind::Inference => status.inferred += 1,
            },
        }
        status.state = WorkerState::Idle;
        status.updated_at = Utc::now();
    }

    pub fn record_malformed(&self, reason: impl Into<String>) {
        let mut status = self.write();
        status.malformed += 1;
        status.last_error = Some(reason.into());
        status.updated_at = Utc::now();
    }

    pub fn record_error(&self, reason: impl Into<String>) {
        let mut status = self.write();
        status.last_error = Some(reason.into());
        status.updated_at = Utc::now();
    }

    fn read(&self) -> RwLockReadGuard<'_, WorkerStatus> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorkerStatus> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
