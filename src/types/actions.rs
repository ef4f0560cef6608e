//! The closed set of repository actions a headless automation job may carry.
//!
//! Actions arrive from the API surface as tagged JSON (`"action":
//! "add-commit"`, etc.) and are interpreted by the executor against the
//! source-control backend. The set is closed: interpreters match
//! exhaustively, so adding a variant is a compile-time event at every
//! dispatch site rather than a runtime surprise.

use serde::{Deserialize, Serialize};

use super::ids::CommitId;

/// One repository operation within an automation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Apply a patch envelope and commit it with the envelope's metadata.
    AddCommit {
        /// Full patch envelope text (headers, description, diff).
        content: String,
    },

    /// Merge a target commit into the current working tree.
    MergeOnto {
        /// The commit to merge in.
        target: CommitId,

        /// The merge commit message.
        message: String,
    },

    /// Create a tag at the current head.
    Tag {
        /// The tag name.
        name: String,
    },

    /// Create a branch pointing at the given commit.
    AddBranch {
        /// The branch name.
        name: String,

        /// The commit the branch should point at.
        commit: CommitId,
    },
}

impl Action {
    /// Returns the wire tag for this action, for log lines and messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::AddCommit { .. } => "add-commit",
            Action::MergeOnto { .. } => "merge-onto",
            Action::Tag { .. } => "tag",
            Action::AddBranch { .. } => "add-branch",
        }
    }
}
