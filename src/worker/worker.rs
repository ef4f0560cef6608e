//! The landing worker loop.
//!
//! One worker serves a set of configured repositories. Each iteration it
//! recomputes which of them are eligible, claims the queue head for that
//! set, and runs the claimed job through the landing pipeline. The loop
//! itself never fails: store and backend problems are logged, the job is
//! deferred or failed by the pipeline, and the worker keeps going until an
//! operator stops it.
//!
//! # Loop shape
//!
//! 1. Exit if stopped or shut down; idle while paused.
//! 2. Refresh the eligible set when it has diverged from the configured
//!    set.
//! 3. If the previous job did not finish, sleep and refresh before
//!    claiming again, so a closed tree is noticed before the retry.
//! 4. Claim the queue head for the eligible repositories; sleep when the
//!    queue is empty.
//! 5. Execute the job, recording the attempt duration whatever the
//!    outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::exec::execute_job;
use crate::notify::RepoNotifier;
use crate::queue::JobStore;
use crate::scm::Scm;
use crate::types::{RepoName, RepoSpec};

use super::control::ControlPlane;
use super::eligibility::{eligible_repos, TreeStatus};
use super::settings::WorkerSettings;

/// A worker that lands queued jobs for its configured repositories.
pub struct LandingWorker<S, C, N, T> {
    settings: WorkerSettings,
    store: Arc<S>,
    scms: HashMap<RepoName, Arc<C>>,
    notifier: Arc<N>,
    tree_status: Arc<T>,
    control: Arc<dyn ControlPlane>,
    shutdown: CancellationToken,

    /// Everything this worker is configured to serve.
    applicable_repos: Vec<RepoSpec>,

    /// The subset currently eligible for landing. Starts empty so the
    /// first iteration computes it.
    enabled_repos: Vec<RepoSpec>,

    /// Whether the most recent job attempt reached a terminal status.
    last_job_finished: Option<bool>,

    loops_completed: u64,
}

impl<S, C, N, T> LandingWorker<S, C, N, T>
where
    S: JobStore,
    C: Scm,
    N: RepoNotifier,
    T: TreeStatus,
{
    pub fn new(
        settings: WorkerSettings,
        store: Arc<S>,
        notifier: Arc<N>,
        tree_status: Arc<T>,
        control: Arc<dyn ControlPlane>,
        shutdown: CancellationToken,
        repos: Vec<(RepoSpec, Arc<C>)>,
    ) -> Self {
        let mut applicable_repos = Vec::with_capacity(repos.len());
        let mut scms = HashMap::with_capacity(repos.len());
        for (spec, scm) in repos {
            scms.insert(spec.name.clone(), scm);
            applicable_repos.push(spec);
        }

        LandingWorker {
            settings,
            store,
            scms,
            notifier,
            tree_status,
            control,
            shutdown,
            applicable_repos,
            enabled_repos: Vec::new(),
            last_job_finished: None,
            loops_completed: 0,
        }
    }

    /// Runs until stopped, shut down, or the loop cap is reached.
    #[instrument(skip_all, fields(worker = %self.settings.name))]
    pub async fn run(mut self) {
        if self.control.is_stopped() {
            info!("worker is stopped, not starting");
            return;
        }
        info!(
            repos = self.applicable_repos.len(),
            "landing worker starting"
        );

        'main: while !self.control.is_stopped() && !self.shutdown.is_cancelled() {
            if let Some(max_loops) = self.settings.max_loops {
                if self.loops_completed >= max_loops {
                    info!(loops = self.loops_completed, "loop cap reached");
                    break;
                }
            }

            while self.control.is_paused() {
                if self.control.is_stopped() || self.shutdown.is_cancelled() {
                    break 'main;
                }
                debug!("worker is paused");
                self.sleep().await;
            }

            self.tick().await;
            self.loops_completed += 1;
        }

        info!(loops = self.loops_completed, "landing worker exiting");
    }

    /// One loop iteration: refresh eligibility, claim, execute.
    async fn tick(&mut self) {
        if self.enabled_repos.len() != self.applicable_repos.len() {
            self.refresh_enabled_repos().await;
        }

        if self.last_job_finished == Some(false) {
            info!("last job did not finish, pausing before next claim");
            self.sleep().await;
            self.refresh_enabled_repos().await;
        }

        // An empty filter would admit every repository, so never claim
        // with one.
        if self.enabled_repos.is_empty() {
            debug!("no eligible repositories");
            self.sleep().await;
            return;
        }

        let names: Vec<RepoName> = self
            .enabled_repos
            .iter()
            .map(|repo| repo.name.clone())
            .collect();

        let claimed = match self.store.claim_next(&names, self.settings.grace).await {
            Ok(claimed) => claimed,
            Err(queue_error) => {
                error!(error = %queue_error, "failed to claim from the queue");
                self.sleep().await;
                return;
            }
        };

        let Some(job) = claimed else {
            debug!("no claimable jobs");
            self.sleep().await;
            return;
        };
        info!(
            job = %job.id,
            repo = %job.repository_name,
            attempt = job.attempts,
            "claimed landing job"
        );

        let repo = self
            .enabled_repos
            .iter()
            .find(|repo| repo.name == job.repository_name)
            .cloned();
        let scm = self.scms.get(&job.repository_name).cloned();
        let (Some(repo), Some(scm)) = (repo, scm) else {
            // The claim filter came from the eligible set, so this means
            // the configuration changed under us. Leave the job claimed;
            // it surfaces at the queue head again on the next pass.
            error!(
                job = %job.id,
                repo = %job.repository_name,
                "claimed a job for an unconfigured repository"
            );
            self.sleep().await;
            return;
        };

        let started = Instant::now();
        let outcome = execute_job(
            self.store.as_ref(),
            scm.as_ref(),
            self.notifier.as_ref(),
            &repo,
            &job,
        )
        .await;
        let elapsed = started.elapsed();

        // Duration is recorded for every attempt, finished or not.
        if let Err(queue_error) = self.store.record_duration(job.id, elapsed).await {
            error!(job = %job.id, error = %queue_error, "failed to record attempt duration");
        }

        match outcome {
            Ok(disposition) => {
                info!(
                    job = %job.id,
                    status = %disposition.status,
                    seconds = elapsed.as_secs(),
                    "job attempt complete"
                );
                self.last_job_finished = Some(disposition.finished);
            }
            Err(queue_error) => {
                error!(job = %job.id, error = %queue_error, "landing pipeline store failure");
                self.last_job_finished = Some(false);
            }
        }
    }

    async fn refresh_enabled_repos(&mut self) {
        self.enabled_repos =
            eligible_repos(self.tree_status.as_ref(), &self.applicable_repos).await;
        info!(
            enabled = self.enabled_repos.len(),
            applicable = self.applicable_repos.len(),
            "refreshed eligible repositories"
        );
    }

    /// Idles for the configured sleep, waking early on shutdown.
    async fn sleep(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.sleep) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}
