//! Failure classification for landing attempts.
//!
//! Whether an attempt is retried is decided here, in one pure function from
//! (pipeline phase, error kind) to a verdict. Callers never branch on
//! concrete error types: transient failures defer the job so the worker
//! revisits it after the grace period, everything else fails it
//! permanently with a message for the requester.

use crate::queue::JobVerb;
use crate::scm::ScmError;
use crate::types::{RepoSpec, RevisionId};

/// The unit of work being applied when an apply-phase error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyUnit {
    /// A revision patch from the revision-landing variant.
    Revision(RevisionId),

    /// A typed action (by zero-based position) from the automation variant.
    Action(usize),
}

/// The pipeline phase an error escaped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pull,
    Apply(ApplyUnit),
    Push,
}

/// The typed outcome of classifying a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Transient: put the job back in the queue for a later retry.
    Defer { message: String },

    /// Permanent: finish the job as failed.
    Fail { message: String },
}

impl Verdict {
    pub fn is_defer(&self) -> bool {
        matches!(self, Verdict::Defer { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Verdict::Defer { message } | Verdict::Fail { message } => message,
        }
    }

    /// The status verb this verdict applies to the job.
    pub fn into_verb(self) -> JobVerb {
        match self {
            Verdict::Defer { message } => JobVerb::Defer { message },
            Verdict::Fail { message } => JobVerb::Fail { message },
        }
    }
}

/// Push failures worth retrying: the tree may reopen, the race may clear,
/// the server may recover.
fn is_transient_push_error(error: &ScmError) -> bool {
    matches!(
        error,
        ScmError::TreeClosed { .. }
            | ScmError::ApprovalRequired { .. }
            | ScmError::LostPushRace { .. }
            | ScmError::PushTimeout { .. }
            | ScmError::InternalServerError { .. }
    )
}

fn is_malformed_patch(error: &ScmError) -> bool {
    matches!(error, ScmError::NoDiffStart | ScmError::MissingHeader(_))
}

/// Maps a failed attempt onto a defer/fail verdict with its user-facing
/// message.
pub fn classify(repo: &RepoSpec, phase: Phase, error: &ScmError) -> Verdict {
    match phase {
        Phase::Pull => match error {
            ScmError::InternalServerError { .. } => Verdict::Defer {
                message: format!(
                    "Temporary error ({}) encountered while pulling from tree: {}, pull path: {}",
                    error.kind_name(),
                    repo.tree_name(),
                    repo.pull_path,
                ),
            },
            _ => Verdict::Fail {
                message: format!(
                    "Unexpected error while fetching repo from {}.\n{}",
                    repo.pull_path, error,
                ),
            },
        },

        Phase::Apply(unit) => match error {
            ScmError::PatchConflict { .. } => Verdict::Fail {
                message: match unit {
                    ApplyUnit::Revision(revision) => format!(
                        "Problem while applying patch in revision {revision}.\n\n{error}"
                    ),
                    ApplyUnit::Action(index) => {
                        format!("Problem while applying patch in action {index}.\n\n{error}")
                    }
                },
            },
            _ if is_malformed_patch(error) => Verdict::Fail {
                message: format!(
                    "Encountered a malformed patch, please try again. \
                     If this error persists please file a bug: {error}."
                ),
            },
            _ => Verdict::Fail {
                message: format!("Aborting, could not apply patch buffer.\n{error}"),
            },
        },

        Phase::Push => {
            if is_transient_push_error(error) {
                Verdict::Defer {
                    message: format!(
                        "Temporary error ({}) encountered while pushing to tree: {}, push path: {}",
                        error.kind_name(),
                        repo.tree_name(),
                        repo.push_path,
                    ),
                }
            } else {
                Verdict::Fail {
                    message: format!(
                        "Unexpected error while pushing to {}.\n{}",
                        repo.push_path, error,
                    ),
                }
            }
        }
    }
}
