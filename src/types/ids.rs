//! Newtype identifiers used throughout the landing engine.
//!
//! These wrap primitive types to prevent mixing up different kinds of
//! identifiers (e.g., passing a diff ID where a revision ID is expected).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A landing job identifier, assigned by the job store on enqueue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        JobId(id)
    }
}

/// A revision identifier from the external review system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RevisionId {
    fn from(id: u64) -> Self {
        RevisionId(id)
    }
}

/// A diff identifier: one concrete patch uploaded for a revision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DiffId(pub u64);

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DiffId {
    fn from(id: u64) -> Self {
        DiffId(id)
    }
}

/// A commit identifier as reported by the version-control backend.
///
/// Kept as an opaque string rather than a validated hex digest so the type
/// stays neutral across backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        CommitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short form (first 12 characters) for display in log lines.
    pub fn short(&self) -> &str {
        // Use get() to avoid panicking when a non-ASCII id has a character
        // straddling the cut; the id is not validated on construction.
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitId {
    fn from(id: &str) -> Self {
        CommitId(id.to_string())
    }
}

impl From<String> for CommitId {
    fn from(id: String) -> Self {
        CommitId(id)
    }
}

/// The name a repository is registered under (queue filters key on this).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName(pub String);

impl RepoName {
    pub fn new(name: impl Into<String>) -> Self {
        RepoName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RepoName {
    fn from(name: &str) -> Self {
        RepoName(name.to_string())
    }
}

impl From<String> for RepoName {
    fn from(name: String) -> Self {
        RepoName(name)
    }
}
