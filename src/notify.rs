//! Post-land notifications.
//!
//! Landing a job changes the upstream repository, and other systems want to
//! hear about it promptly rather than waiting for their next poll. The
//! [`RepoNotifier`] seam carries that hint. Delivery is best-effort by
//! contract: the pipeline logs a failed notification and moves on, because
//! the job has already landed and downstream consumers converge on their
//! own schedule.

use thiserror::Error;

use crate::types::RepoName;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification channel could not be reached.
    #[error("notification channel unavailable: {details}")]
    Unavailable { details: String },

    /// The channel rejected the request.
    #[error("notification rejected: {details}")]
    Rejected { details: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Receives the hint that a repository just gained new commits.
pub trait RepoNotifier: Send + Sync {
    fn repo_landed(
        &self,
        repo: &RepoName,
    ) -> impl std::future::Future<Output = NotifyResult<()>> + Send;
}

/// Notifier that only records the event in the log stream.
///
/// Suitable where no downstream system is wired up. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl RepoNotifier for LoggingNotifier {
    async fn repo_landed(&self, repo: &RepoName) -> NotifyResult<()> {
        tracing::info!(repo = %repo, "repository updated by landing");
        Ok(())
    }
}
