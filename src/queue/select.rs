//! Queue membership and ordering for landing jobs.
//!
//! The queue is a view over job rows, not a separate structure: a job is "in
//! the queue" when its status is non-terminal and, for deferred jobs, the
//! deferral has had a grace period to settle. Ordering puts `IN_PROGRESS`
//! jobs first so a worker that crashed mid-claim re-picks its job before
//! starting anything new, then falls back to creation order.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{JobStatus, LandingJob, RepoName};

/// Default settle time for deferred jobs before they re-enter the queue.
pub const DEFAULT_GRACE_SECONDS: u64 = 60;

/// Returns true if the job belongs to the queue for the given repositories.
///
/// An empty `repository_names` slice means "all repositories". A `Deferred`
/// job is held out of the queue until `grace` has elapsed since its last
/// update, so a deferral is not immediately re-claimed by the same worker.
pub fn in_queue(
    job: &LandingJob,
    repository_names: &[RepoName],
    grace: Duration,
    now: DateTime<Utc>,
) -> bool {
    if !job.status.is_queued() {
        return false;
    }

    if !repository_names.is_empty() && !repository_names.contains(&job.repository_name) {
        return false;
    }

    if job.status == JobStatus::Deferred {
        let settled = now.signed_duration_since(job.updated_at).num_seconds()
            >= grace.as_secs() as i64;
        if !settled {
            return false;
        }
    }

    true
}

/// Ordering of two queued jobs: `IN_PROGRESS` first, then creation order,
/// with the job id as a deterministic tie-break.
pub fn queue_position(a: &LandingJob, b: &LandingJob) -> Ordering {
    let rank = |job: &LandingJob| u8::from(job.status != JobStatus::InProgress);
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Filters and orders job rows into the claimable queue.
pub fn job_queue_query<'a, I>(
    jobs: I,
    repository_names: &[RepoName],
    grace: Duration,
    now: DateTime<Utc>,
) -> Vec<&'a LandingJob>
where
    I: IntoIterator<Item = &'a LandingJob>,
{
    let mut queue: Vec<&LandingJob> = jobs
        .into_iter()
        .filter(|job| in_queue(job, repository_names, grace, now))
        .collect();
    queue.sort_by(|a, b| queue_position(a, b));
    queue
}
