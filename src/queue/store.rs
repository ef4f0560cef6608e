//! The transactional job store boundary.
//!
//! Persistence lives outside the engine; workers only need a handful of
//! operations with atomic claim semantics, captured by [`JobStore`]. The
//! in-memory implementation shipped here backs single-process deployments
//! and is the reference for the trait's contract: `claim_next` selects the
//! queue head, marks it `IN_PROGRESS`, and increments `attempts` in one
//! critical section, so claims never observe a half-updated row.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::select::job_queue_query;
use super::transitions::{self, JobVerb, TransitionError};
use crate::types::{CommitId, ErrorBreakdown, JobId, JobStatus, JobWork, LandingJob, RepoName};

/// Errors from job store operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no landing job with id {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Result type for job store operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// The insert shape for a new landing job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub repository_name: RepoName,
    pub requester_email: String,
    pub work: JobWork,
    pub target_commit: Option<CommitId>,
}

/// A transactional store of landing job rows.
///
/// Implementations must make `claim_next` atomic with respect to other store
/// calls: selection of the queue head and the `IN_PROGRESS`/`attempts`
/// update happen together or not at all.
pub trait JobStore: Send + Sync {
    /// Insert a new job in `SUBMITTED` status and return the stored row.
    fn enqueue(&self, new_job: NewJob) -> impl Future<Output = QueueResult<LandingJob>> + Send;

    /// Claim the queue head for the given repositories, if any.
    ///
    /// The returned job is already `IN_PROGRESS` with `attempts`
    /// incremented. An `IN_PROGRESS` job at the head is claimable again;
    /// that is how a job orphaned by a crashed worker gets picked back up.
    fn claim_next(
        &self,
        repository_names: &[RepoName],
        grace: Duration,
    ) -> impl Future<Output = QueueResult<Option<LandingJob>>> + Send;

    /// Validate and apply a status verb, persisting its field effects.
    fn apply_verb(
        &self,
        id: JobId,
        verb: JobVerb,
        breakdown: Option<ErrorBreakdown>,
    ) -> impl Future<Output = QueueResult<LandingJob>> + Send;

    /// Record the wall-clock duration of the latest attempt.
    fn record_duration(
        &self,
        id: JobId,
        duration: Duration,
    ) -> impl Future<Output = QueueResult<()>> + Send;

    /// Fetch one job row.
    fn get(&self, id: JobId) -> impl Future<Output = QueueResult<LandingJob>> + Send;

    /// The current queue, in claim order.
    fn queue_snapshot(
        &self,
        repository_names: &[RepoName],
        grace: Duration,
    ) -> impl Future<Output = QueueResult<Vec<LandingJob>>> + Send;
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: u64,
    jobs: BTreeMap<JobId, LandingJob>,
}

/// In-memory [`JobStore`] behind a single async mutex.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<StoreInner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-insert a previously persisted row, e.g. when seeding at startup.
    /// Keeps the id counter ahead of the restored id.
    pub async fn restore(&self, job: LandingJob) {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(job.id.0);
        inner.jobs.insert(job.id, job);
    }
}

impl JobStore for MemoryJobStore {
    async fn enqueue(&self, new_job: NewJob) -> QueueResult<LandingJob> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = JobId(inner.next_id);

        let now = Utc::now();
        let mut job = LandingJob::new_submitted(
            id,
            new_job.repository_name,
            new_job.requester_email,
            new_job.work,
            now,
        );
        job.target_commit = new_job.target_commit;

        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn claim_next(
        &self,
        repository_names: &[RepoName],
        grace: Duration,
    ) -> QueueResult<Option<LandingJob>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let head = job_queue_query(inner.jobs.values(), repository_names, grace, now)
            .into_iter()
            .next()
            .map(|job| job.id);

        let Some(id) = head else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.status = JobStatus::InProgress;
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn apply_verb(
        &self,
        id: JobId,
        verb: JobVerb,
        breakdown: Option<ErrorBreakdown>,
    ) -> QueueResult<LandingJob> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        transitions::apply(job, verb, breakdown, Utc::now())?;
        Ok(job.clone())
    }

    async fn record_duration(&self, id: JobId, duration: Duration) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.duration_seconds = duration.as_secs();
        Ok(())
    }

    async fn get(&self, id: JobId) -> QueueResult<LandingJob> {
        let inner = self.inner.lock().await;
        inner.jobs.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    async fn queue_snapshot(
        &self,
        repository_names: &[RepoName],
        grace: Duration,
    ) -> QueueResult<Vec<LandingJob>> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(
            job_queue_query(inner.jobs.values(), repository_names, grace, now)
                .into_iter()
                .cloned()
                .collect(),
        )
    }
}
