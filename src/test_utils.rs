//! Shared test fixtures, fakes, and arbitrary generators for
//! property-based testing.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use crate::notify::{NotifyError, NotifyResult, RepoNotifier};
use crate::queue::{JobVerb, NewJob};
use crate::scm::{PushLease, Scm, ScmError, ScmResult};
use crate::types::{
    Action, CommitId, JobId, JobStatus, JobWork, LandingJob, RepoName, RepoSpec,
};

pub fn submitted_job(id: JobId, repo: &str, created_at: DateTime<Utc>) -> LandingJob {
    LandingJob::new_submitted(
        id,
        RepoName::new(repo),
        "dev@example.com",
        JobWork::empty_revisions(),
        created_at,
    )
}

pub fn new_actions_job(repo: &str) -> NewJob {
    NewJob {
        repository_name: RepoName::new(repo),
        requester_email: "dev@example.com".to_string(),
        work: JobWork::Actions {
            actions: vec![Action::Tag {
                name: "nightly".to_string(),
            }],
        },
        target_commit: None,
    }
}

pub fn test_repo_spec(name: &str) -> RepoSpec {
    RepoSpec {
        name: RepoName::new(name),
        tree: None,
        pull_path: format!("https://vcs.example.test/{name}"),
        push_path: format!("ssh://vcs.example.test/{name}"),
        push_target: String::new(),
        default_branch: "main".to_string(),
        force_push: false,
        enabled: true,
        system_path: PathBuf::from(format!("/tmp/repos/{name}")),
    }
}

/// A complete patch envelope with the given commit message.
pub fn hg_envelope(message: &str) -> String {
    format!(
        "# HG changeset patch\n\
         # User Test User <test@example.com>\n\
         # Date 1496239141 +0000\n\
         {message}\n\
         \n\
         diff --git a/file.txt b/file.txt\n\
         --- a/file.txt\n\
         +++ b/file.txt\n\
         @@ -1,1 +1,2 @@\n\
         \x20line\n\
         +line two\n"
    )
}

pub fn arb_commit_id() -> impl Strategy<Value = CommitId> {
    "[0-9a-f]{40}".prop_map(CommitId::new)
}

pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
    prop_oneof![
        Just(JobStatus::Submitted),
        Just(JobStatus::InProgress),
        Just(JobStatus::Deferred),
        Just(JobStatus::Failed),
        Just(JobStatus::Landed),
        Just(JobStatus::Cancelled),
    ]
}

pub fn arb_job_verb() -> impl Strategy<Value = JobVerb> {
    prop_oneof![
        arb_commit_id().prop_map(|commit_id| JobVerb::Land { commit_id }),
        "[a-zA-Z0-9 ]{1,60}".prop_map(|message| JobVerb::Fail { message }),
        "[a-zA-Z0-9 ]{1,60}".prop_map(|message| JobVerb::Defer { message }),
        Just(JobVerb::Cancel),
    ]
}

pub fn arb_action() -> impl Strategy<Value = Action> {
    let name = "[a-z][a-z0-9._/-]{0,30}";
    prop_oneof![
        "[ -~]{0,80}".prop_map(|content| Action::AddCommit { content }),
        (arb_commit_id(), "[a-zA-Z0-9 ]{1,40}")
            .prop_map(|(target, message)| Action::MergeOnto { target, message }),
        name.prop_map(|name| Action::Tag { name }),
        (name, arb_commit_id()).prop_map(|(name, commit)| Action::AddBranch { name, commit }),
    ]
}

pub fn arb_scm_error() -> impl Strategy<Value = ScmError> {
    let details = "[a-zA-Z0-9 ]{1,40}";
    prop_oneof![
        (prop::collection::vec("[a-z/.]{1,20}", 0..3), prop::option::of(details))
            .prop_map(|(failed_paths, rejects)| ScmError::PatchConflict {
                failed_paths,
                rejects,
            }),
        prop::strategy::LazyJust::new(|| ScmError::NoDiffStart),
        prop::strategy::LazyJust::new(|| ScmError::MissingHeader("User")),
        details.prop_map(|details| ScmError::LostPushRace { details }),
        details.prop_map(|details| ScmError::PushTimeout { details }),
        details.prop_map(|details| ScmError::TreeClosed { details }),
        details.prop_map(|details| ScmError::ApprovalRequired { details }),
        details.prop_map(|details| ScmError::InternalServerError { details }),
        (details, details).prop_map(|(command, stderr)| ScmError::Command { command, stderr }),
        details.prop_map(|details| {
            ScmError::Io(std::io::Error::new(std::io::ErrorKind::Other, details))
        }),
    ]
}

/// Scripted in-memory [`Scm`] backend.
///
/// Records every call in order and hands out a fixed head commit. Failures
/// are injected one-shot: `fail_update`, `fail_apply`, and `fail_push` arm
/// an error that the next matching operation returns. `fail_apply` covers
/// all apply-phase operations, whichever runs first consumes it.
pub struct FakeScm {
    lock: Arc<tokio::sync::Mutex<()>>,
    head: Mutex<CommitId>,
    calls: Mutex<Vec<&'static str>>,
    applied_messages: Mutex<Vec<String>>,
    update_error: Mutex<Option<ScmError>>,
    apply_error: Mutex<Option<ScmError>>,
    push_error: Mutex<Option<ScmError>>,
}

impl FakeScm {
    pub fn with_head(head: &str) -> Self {
        FakeScm {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            head: Mutex::new(CommitId::new(head)),
            calls: Mutex::new(Vec::new()),
            applied_messages: Mutex::new(Vec::new()),
            update_error: Mutex::new(None),
            apply_error: Mutex::new(None),
            push_error: Mutex::new(None),
        }
    }

    pub fn set_head(&self, head: &str) {
        *self.head.lock().unwrap() = CommitId::new(head);
    }

    pub fn fail_update(&self, error: ScmError) {
        *self.update_error.lock().unwrap() = Some(error);
    }

    pub fn fail_apply(&self, error: ScmError) {
        *self.apply_error.lock().unwrap() = Some(error);
    }

    pub fn fail_push(&self, error: ScmError) {
        *self.push_error.lock().unwrap() = Some(error);
    }

    /// Every backend operation invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Commit messages of the patches applied so far.
    pub fn applied_messages(&self) -> Vec<String> {
        self.applied_messages.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn take(error: &Mutex<Option<ScmError>>) -> Option<ScmError> {
        error.lock().unwrap().take()
    }
}

impl Scm for FakeScm {
    async fn for_push(&self, requester_email: &str) -> ScmResult<PushLease> {
        self.record("for_push");
        let guard = self.lock.clone().lock_owned().await;
        Ok(PushLease::new(requester_email, guard))
    }

    async fn update_repo(
        &self,
        _lease: &PushLease,
        target: Option<&CommitId>,
    ) -> ScmResult<CommitId> {
        self.record("update_repo");
        if let Some(error) = Self::take(&self.update_error) {
            return Err(error);
        }
        let mut head = self.head.lock().unwrap();
        if let Some(target) = target {
            *head = target.clone();
        }
        Ok(head.clone())
    }

    async fn apply_patch(
        &self,
        _lease: &PushLease,
        _diff: &str,
        message: &str,
        _author: &str,
        _date: &str,
    ) -> ScmResult<()> {
        self.record("apply_patch");
        if let Some(error) = Self::take(&self.apply_error) {
            return Err(error);
        }
        self.applied_messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn merge_onto(
        &self,
        _lease: &PushLease,
        _target: &CommitId,
        _message: &str,
    ) -> ScmResult<CommitId> {
        self.record("merge_onto");
        if let Some(error) = Self::take(&self.apply_error) {
            return Err(error);
        }
        Ok(self.head.lock().unwrap().clone())
    }

    async fn tag(&self, _lease: &PushLease, _name: &str) -> ScmResult<()> {
        self.record("tag");
        match Self::take(&self.apply_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn add_branch(
        &self,
        _lease: &PushLease,
        _name: &str,
        _commit: &CommitId,
    ) -> ScmResult<()> {
        self.record("add_branch");
        match Self::take(&self.apply_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn push(&self, _lease: &PushLease) -> ScmResult<()> {
        self.record("push");
        match Self::take(&self.push_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn head_ref(&self, _lease: &PushLease) -> ScmResult<CommitId> {
        self.record("head_ref");
        Ok(self.head.lock().unwrap().clone())
    }
}

/// Notifier that records which repositories were reported as landed.
pub struct RecordingNotifier {
    notified: Mutex<Vec<RepoName>>,
    error: Mutex<Option<NotifyError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier {
            notified: Mutex::new(Vec::new()),
            error: Mutex::new(None),
        }
    }

    /// A notifier whose next notification fails with the given error.
    pub fn failing(error: NotifyError) -> Self {
        let notifier = RecordingNotifier::new();
        *notifier.error.lock().unwrap() = Some(error);
        notifier
    }

    pub fn notified(&self) -> Vec<RepoName> {
        self.notified.lock().unwrap().clone()
    }
}

impl RepoNotifier for RecordingNotifier {
    async fn repo_landed(&self, repo: &RepoName) -> NotifyResult<()> {
        self.notified.lock().unwrap().push(repo.clone());
        match self.error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
