//! Landing job rows: status, work payload, and result fields.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actions::Action;
use super::ids::{CommitId, DiffId, JobId, RepoName, RevisionId};

/// Lifecycle status of a landing job.
///
/// `Submitted` jobs are waiting in the queue. A worker claim moves a job to
/// `InProgress`; the attempt then ends in `Landed`, `Failed`, or `Deferred`
/// (retry later). `Cancelled` is only reachable from `Submitted` or
/// `Deferred`, via the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Deferred,
    Failed,
    Landed,
    Cancelled,
}

impl JobStatus {
    /// Returns the wire name of this status (`"IN_PROGRESS"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Deferred => "DEFERRED",
            JobStatus::Failed => "FAILED",
            JobStatus::Landed => "LANDED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Landed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true if the status makes the job visible to the queue.
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::InProgress | JobStatus::Deferred
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One patch within the revision-landing variant of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPatch {
    /// The revision this patch lands.
    pub revision: RevisionId,

    /// The concrete diff chosen for the revision.
    pub diff: DiffId,

    /// Full patch envelope text.
    pub content: String,
}

/// The work a job carries: either an ordered revision set or a list of
/// typed actions. The two worker kinds share the job shape and differ only
/// in which variant they enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobWork {
    /// Revision-landing variant: patches applied in `revision_order`.
    Revisions {
        revision_order: Vec<RevisionId>,
        revision_to_diff: BTreeMap<RevisionId, DiffId>,
        patches: Vec<RevisionPatch>,
    },

    /// Headless-automation variant: typed actions executed in order.
    Actions { actions: Vec<Action> },
}

impl JobWork {
    /// Number of units (patches or actions) the executor will apply.
    pub fn unit_count(&self) -> usize {
        match self {
            JobWork::Revisions { patches, .. } => patches.len(),
            JobWork::Actions { actions } => actions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unit_count() == 0
    }

    /// An empty revision-landing payload, useful as a queue placeholder.
    pub fn empty_revisions() -> Self {
        JobWork::Revisions {
            revision_order: Vec::new(),
            revision_to_diff: BTreeMap::new(),
            patches: Vec::new(),
        }
    }
}

/// Structured detail recorded when a patch conflict fails a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    /// The revision whose patch conflicted, when known.
    pub revision_id: Option<RevisionId>,

    /// Paths the backend reported as failing to apply.
    pub failed_paths: Vec<String>,

    /// Raw reject/conflict output from the backend, when available.
    pub rejects: Option<String>,
}

/// A landing job row.
///
/// Result fields obey the status: `landed_commit_id` is set exactly when the
/// status is `Landed`; `error` is set for `Failed` and `Deferred` attempts
/// and cleared on a successful land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingJob {
    pub id: JobId,
    pub status: JobStatus,
    pub repository_name: RepoName,
    pub requester_email: String,
    pub work: JobWork,

    /// Optional commit to pin the pull step to instead of the remote head.
    pub target_commit: Option<CommitId>,

    /// Number of times a worker has picked this job up.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Human-readable failure or deferral message from the last attempt.
    pub error: Option<String>,

    /// Structured conflict detail from the last failed attempt.
    pub error_breakdown: Option<ErrorBreakdown>,

    /// The new head recorded when the job landed.
    pub landed_commit_id: Option<CommitId>,

    /// Wall-clock duration of the most recent attempt, in whole seconds.
    pub duration_seconds: u64,
}

impl LandingJob {
    /// A freshly submitted job with the given identity and work.
    pub fn new_submitted(
        id: JobId,
        repository_name: RepoName,
        requester_email: impl Into<String>,
        work: JobWork,
        now: DateTime<Utc>,
    ) -> Self {
        LandingJob {
            id,
            status: JobStatus::Submitted,
            repository_name,
            requester_email: requester_email.into(),
            work,
            target_commit: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            error: None,
            error_breakdown: None,
            landed_commit_id: None,
            duration_seconds: 0,
        }
    }
}
