//! Status transitions for landing jobs.
//!
//! Transitions are driven by verbs rather than written directly: a worker
//! finishing an attempt applies `Land`, `Fail`, or `Defer`; the API surface
//! applies `Cancel` on a user's behalf. [`transition`] is the single place
//! that knows which verb is legal from which status, so the legality table
//! can be tested exhaustively without a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CommitId, ErrorBreakdown, JobStatus, LandingJob};

/// A requested status change for a landing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobVerb {
    /// The attempt landed; record the new head.
    Land { commit_id: CommitId },

    /// The attempt failed permanently.
    Fail { message: String },

    /// The attempt hit a transient problem; retry later.
    Defer { message: String },

    /// Withdraw a job that has not started.
    Cancel,
}

impl JobVerb {
    pub fn name(&self) -> &'static str {
        match self {
            JobVerb::Land { .. } => "LAND",
            JobVerb::Fail { .. } => "FAIL",
            JobVerb::Defer { .. } => "DEFER",
            JobVerb::Cancel => "CANCEL",
        }
    }
}

/// A verb applied from a status that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Cancellation is only allowed before a worker picks the job up.
    #[error("Landing job status ({status}) does not allow cancelling.")]
    CannotCancel { status: JobStatus },

    /// Worker verbs only apply to jobs still in the queue.
    #[error("cannot apply {verb} to a job in status {status}")]
    Invalid {
        verb: &'static str,
        status: JobStatus,
    },
}

/// Computes the status a verb moves a job to, or why it may not.
///
/// `Land`/`Fail`/`Defer` accept any queued source status, not just
/// `InProgress`: pre-processing can fail a job before a worker claims it.
pub fn transition(status: JobStatus, verb: &JobVerb) -> Result<JobStatus, TransitionError> {
    match (status, verb) {
        (
            JobStatus::Submitted | JobStatus::Deferred | JobStatus::InProgress,
            JobVerb::Land { .. },
        ) => Ok(JobStatus::Landed),
        (
            JobStatus::Submitted | JobStatus::Deferred | JobStatus::InProgress,
            JobVerb::Fail { .. },
        ) => Ok(JobStatus::Failed),
        (
            JobStatus::Submitted | JobStatus::Deferred | JobStatus::InProgress,
            JobVerb::Defer { .. },
        ) => Ok(JobStatus::Deferred),
        (JobStatus::Submitted | JobStatus::Deferred, JobVerb::Cancel) => Ok(JobStatus::Cancelled),
        (status, JobVerb::Cancel) => Err(TransitionError::CannotCancel { status }),
        (status, verb) => Err(TransitionError::Invalid {
            verb: verb.name(),
            status,
        }),
    }
}

/// Applies a verb to a job row: validates the transition, then updates the
/// status and result fields together so they cannot drift apart.
///
/// On error the job is untouched.
pub fn apply(
    job: &mut LandingJob,
    verb: JobVerb,
    breakdown: Option<ErrorBreakdown>,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let next = transition(job.status, &verb)?;

    match verb {
        JobVerb::Land { commit_id } => {
            job.landed_commit_id = Some(commit_id);
            job.error = None;
            job.error_breakdown = None;
        }
        JobVerb::Fail { message } => {
            job.error = Some(message);
            job.error_breakdown = breakdown;
        }
        JobVerb::Defer { message } => {
            job.error = Some(message);
        }
        JobVerb::Cancel => {}
    }

    job.status = next;
    job.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::submitted_job;
    use crate::types::JobId;

    fn job_in(status: JobStatus) -> LandingJob {
        let mut job = submitted_job(JobId(1), "test-repo", Utc::now());
        job.status = status;
        job
    }

    mod legality_tests {
        use super::*;

        #[test]
        fn worker_verbs_from_queued_statuses_only() {
            let land = JobVerb::Land {
                commit_id: CommitId::new("abc"),
            };
            let fail = JobVerb::Fail {
                message: "m".to_string(),
            };
            let defer = JobVerb::Defer {
                message: "m".to_string(),
            };

            for status in [
                JobStatus::Submitted,
                JobStatus::Deferred,
                JobStatus::InProgress,
            ] {
                assert_eq!(transition(status, &land), Ok(JobStatus::Landed));
                assert_eq!(transition(status, &fail), Ok(JobStatus::Failed));
                assert_eq!(transition(status, &defer), Ok(JobStatus::Deferred));
            }

            for status in [JobStatus::Failed, JobStatus::Landed, JobStatus::Cancelled] {
                for verb in [&land, &fail, &defer] {
                    assert_eq!(
                        transition(status, verb),
                        Err(TransitionError::Invalid {
                            verb: verb.name(),
                            status,
                        }),
                        "{} should be illegal from {}",
                        verb.name(),
                        status,
                    );
                }
            }
        }

        #[test]
        fn cancel_from_submitted_and_deferred_only() {
            assert_eq!(
                transition(JobStatus::Submitted, &JobVerb::Cancel),
                Ok(JobStatus::Cancelled)
            );
            assert_eq!(
                transition(JobStatus::Deferred, &JobVerb::Cancel),
                Ok(JobStatus::Cancelled)
            );

            for status in [
                JobStatus::InProgress,
                JobStatus::Failed,
                JobStatus::Landed,
                JobStatus::Cancelled,
            ] {
                assert_eq!(
                    transition(status, &JobVerb::Cancel),
                    Err(TransitionError::CannotCancel { status })
                );
            }
        }

        #[test]
        fn cancel_in_progress_message_names_the_status() {
            let error = transition(JobStatus::InProgress, &JobVerb::Cancel).unwrap_err();
            assert_eq!(
                error.to_string(),
                "Landing job status (IN_PROGRESS) does not allow cancelling."
            );
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn land_records_commit_and_clears_error() {
            let mut job = job_in(JobStatus::InProgress);
            job.error = Some("earlier deferral".to_string());

            let now = Utc::now();
            apply(
                &mut job,
                JobVerb::Land {
                    commit_id: CommitId::new("abcdef"),
                },
                None,
                now,
            )
            .unwrap();

            assert_eq!(job.status, JobStatus::Landed);
            assert_eq!(job.landed_commit_id, Some(CommitId::new("abcdef")));
            assert_eq!(job.error, None);
            assert_eq!(job.updated_at, now);
        }

        #[test]
        fn fail_records_message_and_breakdown() {
            let mut job = job_in(JobStatus::InProgress);
            let breakdown = ErrorBreakdown {
                revision_id: None,
                failed_paths: vec!["src/lib.rs".to_string()],
                rejects: None,
            };

            apply(
                &mut job,
                JobVerb::Fail {
                    message: "conflict".to_string(),
                },
                Some(breakdown.clone()),
                Utc::now(),
            )
            .unwrap();

            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some("conflict"));
            assert_eq!(job.error_breakdown, Some(breakdown));
            assert_eq!(job.landed_commit_id, None);
        }

        #[test]
        fn defer_records_message_only() {
            let mut job = job_in(JobStatus::InProgress);

            apply(
                &mut job,
                JobVerb::Defer {
                    message: "tree closed".to_string(),
                },
                None,
                Utc::now(),
            )
            .unwrap();

            assert_eq!(job.status, JobStatus::Deferred);
            assert_eq!(job.error.as_deref(), Some("tree closed"));
            assert_eq!(job.error_breakdown, None);
        }

        #[test]
        fn fail_before_claim_records_message() {
            let mut job = job_in(JobStatus::Submitted);

            apply(
                &mut job,
                JobVerb::Fail {
                    message: "rejected during pre-processing".to_string(),
                },
                None,
                Utc::now(),
            )
            .unwrap();

            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some("rejected during pre-processing"));
        }

        #[test]
        fn illegal_verb_leaves_job_untouched() {
            let mut job = job_in(JobStatus::Landed);
            let before = job.clone();

            let result = apply(
                &mut job,
                JobVerb::Land {
                    commit_id: CommitId::new("abc"),
                },
                None,
                Utc::now(),
            );

            assert!(result.is_err());
            assert_eq!(job, before);
        }
    }

    mod property_tests {
        use super::*;
        use crate::test_utils::{arb_job_status, arb_job_verb};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn transition_never_leaves_terminal_states(
                status in arb_job_status(),
                verb in arb_job_verb(),
            ) {
                if status.is_terminal() {
                    prop_assert!(transition(status, &verb).is_err());
                }
            }

            #[test]
            fn successful_transitions_agree_with_apply(
                status in arb_job_status(),
                verb in arb_job_verb(),
            ) {
                let mut job = job_in(status);
                let expected = transition(status, &verb);
                let applied = apply(&mut job, verb, None, Utc::now());

                match expected {
                    Ok(next) => {
                        prop_assert!(applied.is_ok());
                        prop_assert_eq!(job.status, next);
                    }
                    Err(error) => {
                        prop_assert_eq!(applied.unwrap_err(), error);
                        prop_assert_eq!(job.status, status);
                    }
                }
            }

            #[test]
            fn landed_commit_set_exactly_on_land(
                status in arb_job_status(),
                verb in arb_job_verb(),
            ) {
                let mut job = job_in(status);
                let is_land = matches!(verb, JobVerb::Land { .. });

                if apply(&mut job, verb, None, Utc::now()).is_ok() {
                    prop_assert_eq!(job.landed_commit_id.is_some(), is_land);
                    prop_assert_eq!(job.status == JobStatus::Landed, is_land);
                }
            }
        }
    }
}
