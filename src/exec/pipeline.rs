//! The landing pipeline: pull, apply, push, record.
//!
//! [`execute_job`] drives one claimed job against its repository. The
//! working copy is held under a [`PushLease`](crate::scm::PushLease) for
//! the whole run, scoped to the requesting user. Every exit path applies a
//! status verb through the store, so callers only observe the resulting
//! [`JobDisposition`].

use tracing::{debug, error, info, instrument, warn};

use super::classify::{classify, ApplyUnit, Phase, Verdict};
use super::patch::parse_patch;
use crate::notify::RepoNotifier;
use crate::queue::{JobStore, JobVerb, QueueResult};
use crate::scm::{Scm, ScmError};
use crate::types::{
    Action, ErrorBreakdown, JobStatus, JobWork, LandingJob, RepoSpec, RevisionId,
};

/// How an attempt left the job.
///
/// `finished` tells the worker loop whether the job reached a terminal
/// status (`Landed`/`Failed`) or was deferred for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDisposition {
    pub status: JobStatus,
    pub finished: bool,
}

/// Runs one claimed job through the landing pipeline.
///
/// The job must already be `IN_PROGRESS` (the store's claim did that).
/// Failures are classified and persisted here; only store errors propagate.
#[instrument(skip_all, fields(job = %job.id, repo = %repo.name))]
pub async fn execute_job<S, C, N>(
    store: &S,
    scm: &C,
    notifier: &N,
    repo: &RepoSpec,
    job: &LandingJob,
) -> QueueResult<JobDisposition>
where
    S: JobStore,
    C: Scm,
    N: RepoNotifier,
{
    // Acquisition failures classify with the pull phase.
    let lease = match scm.for_push(&job.requester_email).await {
        Ok(lease) => lease,
        Err(scm_error) => {
            return settle(store, repo, job, Phase::Pull, &scm_error, None).await;
        }
    };
    debug!(requester = %lease.requester_email(), "acquired working copy");

    match scm.update_repo(&lease, job.target_commit.as_ref()).await {
        Ok(head) => debug!(head = %head.short(), "working copy updated"),
        Err(scm_error) => {
            return settle(store, repo, job, Phase::Pull, &scm_error, None).await;
        }
    }

    match &job.work {
        JobWork::Revisions { patches, .. } => {
            for patch_row in patches {
                let unit = ApplyUnit::Revision(patch_row.revision);
                if let Err(scm_error) = apply_envelope(scm, &lease, &patch_row.content).await {
                    let breakdown = conflict_breakdown(&scm_error, Some(patch_row.revision));
                    return settle(store, repo, job, Phase::Apply(unit), &scm_error, breakdown)
                        .await;
                }
                debug!(revision = %patch_row.revision, diff = %patch_row.diff, "patch applied");
            }
        }
        JobWork::Actions { actions } => {
            for (index, action) in actions.iter().enumerate() {
                let unit = ApplyUnit::Action(index);
                if let Err(scm_error) = apply_action(scm, &lease, action).await {
                    let breakdown = conflict_breakdown(&scm_error, None);
                    return settle(store, repo, job, Phase::Apply(unit), &scm_error, breakdown)
                        .await;
                }
                debug!(action = action.kind(), index, "action applied");
            }
        }
    }

    if let Err(scm_error) = scm.push(&lease).await {
        return settle(store, repo, job, Phase::Push, &scm_error, None).await;
    }

    let commit_id = match scm.head_ref(&lease).await {
        Ok(commit_id) => commit_id,
        Err(scm_error) => {
            return settle(store, repo, job, Phase::Push, &scm_error, None).await;
        }
    };

    // Release the working copy before touching the store again.
    drop(lease);

    let landed = store
        .apply_verb(
            job.id,
            JobVerb::Land {
                commit_id: commit_id.clone(),
            },
            None,
        )
        .await?;
    info!(commit = %commit_id.short(), "job landed");

    // Post-land refresh is best-effort: the repo will converge eventually.
    if let Err(notify_error) = notifier.repo_landed(&repo.name).await {
        warn!(error = %notify_error, "failed to request post-land repo refresh");
    }

    Ok(JobDisposition {
        status: landed.status,
        finished: true,
    })
}

/// Parses and applies one patch envelope.
async fn apply_envelope<C: Scm>(
    scm: &C,
    lease: &crate::scm::PushLease,
    content: &str,
) -> Result<(), ScmError> {
    let patch = parse_patch(content)?;
    scm.apply_patch(lease, &patch.diff, &patch.message, &patch.author, &patch.date)
        .await
}

/// Executes one typed action. The action set is closed; a new variant must
/// be handled here before the crate compiles again.
async fn apply_action<C: Scm>(
    scm: &C,
    lease: &crate::scm::PushLease,
    action: &Action,
) -> Result<(), ScmError> {
    match action {
        Action::AddCommit { content } => apply_envelope(scm, lease, content).await,
        Action::MergeOnto { target, message } => {
            let merge_commit = scm.merge_onto(lease, target, message).await?;
            debug!(commit = %merge_commit.short(), "merge committed");
            Ok(())
        }
        Action::Tag { name } => scm.tag(lease, name).await,
        Action::AddBranch { name, commit } => scm.add_branch(lease, name, commit).await,
    }
}

/// Classifies a failure, persists the verdict, and reports the disposition.
async fn settle<S: JobStore>(
    store: &S,
    repo: &RepoSpec,
    job: &LandingJob,
    phase: Phase,
    scm_error: &ScmError,
    breakdown: Option<ErrorBreakdown>,
) -> QueueResult<JobDisposition> {
    let verdict = classify(repo, phase, scm_error);
    match &verdict {
        Verdict::Defer { message } => warn!(%message, "attempt deferred"),
        Verdict::Fail { message } => error!(%message, "attempt failed"),
    }

    let finished = verdict.is_fail();
    let updated = store.apply_verb(job.id, verdict.into_verb(), breakdown).await?;
    Ok(JobDisposition {
        status: updated.status,
        finished,
    })
}

/// Builds the structured conflict record for a failed apply, when the error
/// carries one.
fn conflict_breakdown(
    scm_error: &ScmError,
    revision: Option<RevisionId>,
) -> Option<ErrorBreakdown> {
    match scm_error {
        ScmError::PatchConflict {
            failed_paths,
            rejects,
        } => Some(ErrorBreakdown {
            revision_id: revision,
            failed_paths: failed_paths.clone(),
            rejects: rejects.clone(),
        }),
        _ => None,
    }
}
