//! Previewed imports held between the preview and commit requests.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::logs::log_info;
use crate::error::ServerError;
use crate::models::{ImportKind, ValidationOutcome};
use crate::pipeline::CancelHandle;

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: Uuid,
    pub kind: ImportKind,
    pub created_at: DateTime<Utc>,
    pub outcomes: Vec<ValidationOutcome>,
    pub cancel: CancelHandle,
    pub committing: bool,
}

/// What a `DELETE` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discarded {
    /// Preview dropped before commit.
    Removed,
    /// Commit in progress; it stops before the next row.
    Cancelling,
}

/// How long an uncommitted preview is kept.
pub const JOB_TTL_MINUTES: i64 = 60;

pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, ImportJob>>,
    ttl: Duration,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::with_ttl(Duration::minutes(JOB_TTL_MINUTES))
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Store a preview. Expired previews are dropped first.
    pub async fn insert(&self, kind: ImportKind, outcomes: Vec<ValidationOutcome>) -> ImportJob {
        let now = Utc::now();
        let job = ImportJob {
            id: Uuid::new_v4(),
            kind,
            created_at: now,
            outcomes,
            cancel: CancelHandle::new(),
            committing: false,
        };
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, j| j.committing || now - j.created_at < self.ttl);
        if jobs.len() < before {
            log_info(format!("Expired {} uncommitted import(s)", before - jobs.len()));
        }
        jobs.insert(job.id, job.clone());
        job
    }

    /// Mark a job as committing and hand back a copy to work on.
    pub async fn begin_commit(&self, id: Uuid) -> Result<ImportJob, ServerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| ServerError::JobNotFound(id.to_string()))?;
        if job.committing {
            return Err(ServerError::BadRequest(format!(
                "Import {} is already being committed",
                id
            )));
        }
        job.committing = true;
        Ok(job.clone())
    }

    /// Drop a job once its commit has finished.
    pub async fn finish(&self, id: Uuid) {
        self.jobs.lock().await.remove(&id);
    }

    pub async fn discard(&self, id: Uuid) -> Result<Discarded, ServerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get(&id)
            .ok_or_else(|| ServerError::JobNotFound(id.to_string()))?;
        if job.committing {
            job.cancel.cancel();
            return Ok(Discarded::Cancelling);
        }
        jobs.remove(&id);
        Ok(Discarded::Removed)
    }

    pub async fn count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
