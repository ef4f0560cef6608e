//! Core domain types for the landing engine.

pub mod actions;
pub mod ids;
pub mod job;
pub mod repo;

pub use actions::Action;
pub use ids::{CommitId, DiffId, JobId, RepoName, RevisionId};
pub use job::{ErrorBreakdown, JobStatus, JobWork, LandingJob, RevisionPatch};
pub use repo::RepoSpec;
