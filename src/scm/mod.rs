//! Source-control capability boundary.
//!
//! The engine drives repositories through the [`Scm`] trait: pull, apply
//! work, push, read the head. Implementations own the working copy and
//! serialize access to it with a [`PushLease`], acquired per pipeline run
//! and keyed by the requesting user's email so operations happen in a
//! per-user context.
//!
//! Errors carry a taxonomy rather than backend detail: the failure
//! classifier maps [`ScmError`] kinds onto defer/fail outcomes without ever
//! inspecting backend-specific strings.

pub mod git;

pub use git::{CommitIdentity, GitScm};

use std::future::Future;

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::exec::patch::PatchError;
use crate::types::CommitId;

/// Errors from source-control operations.
#[derive(Debug, Error)]
pub enum ScmError {
    /// A patch or merge did not apply cleanly.
    #[error("patch conflict in {}", failed_paths.join(", "))]
    PatchConflict {
        /// Paths the backend reported as failing to apply.
        failed_paths: Vec<String>,

        /// Raw reject/conflict output, when available.
        rejects: Option<String>,
    },

    /// The patch envelope has no diff start line.
    #[error("patch has no diff start line")]
    NoDiffStart,

    /// The patch envelope lacks a required header.
    #[error("patch is missing required header {0}")]
    MissingHeader(&'static str),

    /// Another writer advanced the remote before our push.
    #[error("lost push race: {details}")]
    LostPushRace { details: String },

    /// The push did not complete in time.
    #[error("push timed out: {details}")]
    PushTimeout { details: String },

    /// The remote rejected the push because the tree is closed.
    #[error("tree is closed: {details}")]
    TreeClosed { details: String },

    /// The remote rejected the push pending approval.
    #[error("tree requires approval: {details}")]
    ApprovalRequired { details: String },

    /// The backend server failed in a way worth retrying.
    #[error("source-control server error: {details}")]
    InternalServerError { details: String },

    /// A backend command failed for a reason outside the taxonomy.
    #[error("scm command failed: {command}\nstderr: {stderr}")]
    Command { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScmError {
    /// Stable kind token for this error, used in deferral messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScmError::PatchConflict { .. } => "patch-conflict",
            ScmError::NoDiffStart => "no-diff-start",
            ScmError::MissingHeader(_) => "missing-header",
            ScmError::LostPushRace { .. } => "lost-push-race",
            ScmError::PushTimeout { .. } => "push-timeout",
            ScmError::TreeClosed { .. } => "tree-closed",
            ScmError::ApprovalRequired { .. } => "approval-required",
            ScmError::InternalServerError { .. } => "internal-server-error",
            ScmError::Command { .. } => "command-failed",
            ScmError::Io(_) => "io",
        }
    }
}

impl From<PatchError> for ScmError {
    fn from(error: PatchError) -> Self {
        match error {
            PatchError::NoDiffStart => ScmError::NoDiffStart,
            PatchError::MissingHeader(header) => ScmError::MissingHeader(header),
        }
    }
}

/// Result type for source-control operations.
pub type ScmResult<T> = Result<T, ScmError>;

/// An exclusive lease on a repository working copy, scoped to one pipeline
/// run and recording the user the work is performed for. Dropping the lease
/// releases the working copy.
pub struct PushLease {
    requester_email: String,
    _guard: OwnedMutexGuard<()>,
}

impl PushLease {
    pub fn new(requester_email: impl Into<String>, guard: OwnedMutexGuard<()>) -> Self {
        PushLease {
            requester_email: requester_email.into(),
            _guard: guard,
        }
    }

    /// The email of the user this landing is performed for.
    pub fn requester_email(&self) -> &str {
        &self.requester_email
    }
}

impl std::fmt::Debug for PushLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushLease")
            .field("requester_email", &self.requester_email)
            .finish_non_exhaustive()
    }
}

/// Operations the landing pipeline needs from a source-control backend.
///
/// Every mutating call takes the [`PushLease`] so the compiler enforces
/// acquisition before use; the lease itself serializes concurrent pipelines
/// on the same working copy.
pub trait Scm: Send + Sync {
    /// Acquire the working copy for a pipeline run on behalf of a user.
    fn for_push(
        &self,
        requester_email: &str,
    ) -> impl Future<Output = ScmResult<PushLease>> + Send;

    /// Sync the working copy from the pull path, optionally pinning to a
    /// target commit instead of the remote head. Returns the resulting
    /// working-copy head.
    fn update_repo(
        &self,
        lease: &PushLease,
        target: Option<&CommitId>,
    ) -> impl Future<Output = ScmResult<CommitId>> + Send;

    /// Apply a diff and commit it with the given message and authorship.
    fn apply_patch(
        &self,
        lease: &PushLease,
        diff: &str,
        message: &str,
        author: &str,
        date: &str,
    ) -> impl Future<Output = ScmResult<()>> + Send;

    /// Merge a target commit into the working tree. Returns the merge
    /// commit.
    fn merge_onto(
        &self,
        lease: &PushLease,
        target: &CommitId,
        message: &str,
    ) -> impl Future<Output = ScmResult<CommitId>> + Send;

    /// Create a tag at the current head.
    fn tag(&self, lease: &PushLease, name: &str) -> impl Future<Output = ScmResult<()>> + Send;

    /// Create a branch pointing at the given commit.
    fn add_branch(
        &self,
        lease: &PushLease,
        name: &str,
        commit: &CommitId,
    ) -> impl Future<Output = ScmResult<()>> + Send;

    /// Push the working-copy head to the configured push path and target.
    fn push(&self, lease: &PushLease) -> impl Future<Output = ScmResult<()>> + Send;

    /// The current working-copy head.
    fn head_ref(&self, lease: &PushLease) -> impl Future<Output = ScmResult<CommitId>> + Send;
}
