//! Git working-copy backend.
//!
//! One [`GitScm`] owns one local clone. Commands run with system and user
//! git configuration disabled, so behavior does not depend on the host the
//! worker happens to run on. Remotes are addressed by URL on every call
//! rather than by a configured remote name, which keeps the clone free of
//! state that could drift from the repository manifest.
//!
//! Git operations block, so each one runs on the blocking thread pool.
//! Serialization of the working copy is the lease's job; by the time a
//! command runs here the caller already holds the [`PushLease`].

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::types::{CommitId, RepoSpec};

use super::{PushLease, Scm, ScmError, ScmResult};

/// Identity recorded as committer on commits created while landing.
///
/// Passed per command via `-c` flags, never written to the clone's config.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    /// git `user.name`.
    pub name: String,

    /// git `user.email`.
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        CommitIdentity {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Reads `AUTOLAND_COMMIT_NAME` and `AUTOLAND_COMMIT_EMAIL`, with
    /// defaults suitable for a service account.
    pub fn from_env() -> Self {
        let name = std::env::var("AUTOLAND_COMMIT_NAME")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "Autoland".to_string());
        let email = std::env::var("AUTOLAND_COMMIT_EMAIL")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "autoland@localhost".to_string());
        CommitIdentity::new(name, email)
    }
}

/// [`Scm`] backed by a local git clone.
pub struct GitScm {
    spec: RepoSpec,
    identity: CommitIdentity,
    lock: Arc<Mutex<()>>,
}

impl GitScm {
    pub fn new(spec: RepoSpec, identity: CommitIdentity) -> Self {
        GitScm {
            spec,
            identity,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn spec(&self) -> &RepoSpec {
        &self.spec
    }

    /// Initializes the working copy if it does not exist yet. Contents
    /// arrive on the first `update_repo`.
    #[instrument(skip(self), fields(repo = %self.spec.name))]
    pub async fn prepare(&self) -> ScmResult<()> {
        let workdir = self.spec.system_path.clone();
        blocking(move || {
            if workdir.join(".git").exists() {
                debug!(path = %workdir.display(), "working copy already initialized");
                return Ok(());
            }
            std::fs::create_dir_all(&workdir)?;
            run_git(&workdir, &["init"])?;
            debug!(path = %workdir.display(), "initialized working copy");
            Ok(())
        })
        .await
    }
}

impl Scm for GitScm {
    async fn for_push(&self, requester_email: &str) -> ScmResult<PushLease> {
        let guard = self.lock.clone().lock_owned().await;
        debug!(repo = %self.spec.name, requester = requester_email, "working copy leased");
        Ok(PushLease::new(requester_email, guard))
    }

    async fn update_repo(
        &self,
        _lease: &PushLease,
        target: Option<&CommitId>,
    ) -> ScmResult<CommitId> {
        let workdir = self.spec.system_path.clone();
        let pull_path = self.spec.pull_path.clone();
        let default_branch = self.spec.default_branch.clone();
        let target = target.cloned();
        blocking(move || {
            fetch(&workdir, &pull_path, &default_branch)?;
            let rev = match &target {
                Some(commit) => commit.as_str(),
                None => "FETCH_HEAD",
            };
            run_git(&workdir, &["checkout", "--force", "--detach", rev])?;
            run_git(&workdir, &["clean", "-fdx"])?;
            head(&workdir)
        })
        .await
    }

    async fn apply_patch(
        &self,
        _lease: &PushLease,
        diff: &str,
        message: &str,
        author: &str,
        date: &str,
    ) -> ScmResult<()> {
        let workdir = self.spec.system_path.clone();
        let identity = self.identity.clone();
        let diff = diff.to_string();
        let message = message.to_string();
        let author = author.to_string();
        let date = date.to_string();
        blocking(move || {
            apply_diff(&workdir, &diff)?;
            let output = commit_command(&workdir, &identity)
                .args(["commit", "-m", &message, "--author", &author, "--date", &date])
                .output()?;
            check_status("git commit", &output)?;
            Ok(())
        })
        .await
    }

    async fn merge_onto(
        &self,
        _lease: &PushLease,
        target: &CommitId,
        message: &str,
    ) -> ScmResult<CommitId> {
        let workdir = self.spec.system_path.clone();
        let identity = self.identity.clone();
        let target = target.clone();
        let message = message.to_string();
        blocking(move || {
            let output = commit_command(&workdir, &identity)
                .args(["merge", "--no-ff", "-m", &message, target.as_str()])
                .output()?;
            if !output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if stdout.contains("CONFLICT") || stderr.contains("CONFLICT") {
                    // Leave the working copy usable for the next job.
                    let _ = run_git(&workdir, &["merge", "--abort"]);
                    return Err(ScmError::PatchConflict {
                        failed_paths: conflict_paths(&stdout),
                        rejects: Some(stdout),
                    });
                }
                return Err(ScmError::Command {
                    command: format!("git merge --no-ff {}", target),
                    stderr,
                });
            }
            head(&workdir)
        })
        .await
    }

    async fn tag(&self, _lease: &PushLease, name: &str) -> ScmResult<()> {
        let workdir = self.spec.system_path.clone();
        let name = name.to_string();
        blocking(move || {
            run_git(&workdir, &["tag", &name])?;
            Ok(())
        })
        .await
    }

    async fn add_branch(
        &self,
        _lease: &PushLease,
        name: &str,
        commit: &CommitId,
    ) -> ScmResult<()> {
        let workdir = self.spec.system_path.clone();
        let name = name.to_string();
        let commit = commit.clone();
        blocking(move || {
            run_git(&workdir, &["branch", &name, commit.as_str()])?;
            Ok(())
        })
        .await
    }

    async fn push(&self, _lease: &PushLease) -> ScmResult<()> {
        let workdir = self.spec.system_path.clone();
        let push_path = self.spec.push_path.clone();
        let refspec = format!("HEAD:refs/heads/{}", self.spec.push_ref());
        let force_push = self.spec.force_push;
        blocking(move || {
            let mut args = vec!["push"];
            if force_push {
                args.push("--force");
            }
            args.push(&push_path);
            args.push(&refspec);

            let output = git_command(&workdir).args(&args).output()?;
            if output.status.success() {
                return Ok(());
            }
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(classify_push_failure(&push_path, stderr))
        })
        .await
    }

    async fn head_ref(&self, _lease: &PushLease) -> ScmResult<CommitId> {
        let workdir = self.spec.system_path.clone();
        blocking(move || head(&workdir)).await
    }
}

/// Runs a blocking git operation off the async runtime.
async fn blocking<T, F>(task: F) -> ScmResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ScmResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|join_error| {
            ScmError::Io(std::io::Error::new(std::io::ErrorKind::Other, join_error))
        })?
}

/// A git Command with system and user configuration disabled and terminal
/// prompts off, so behavior is the same on every host and nothing hangs
/// waiting for credentials.
fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

/// [`git_command`] with the commit identity supplied via `-c` flags.
fn commit_command(workdir: &Path, identity: &CommitIdentity) -> Command {
    let mut cmd = git_command(workdir);
    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd
}

fn run_git(workdir: &Path, args: &[&str]) -> ScmResult<Output> {
    let output = git_command(workdir).args(args).output()?;
    check_status(&format!("git {}", args.join(" ")), &output)?;
    Ok(output)
}

fn run_git_stdout(workdir: &Path, args: &[&str]) -> ScmResult<String> {
    let output = run_git(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_status(command: &str, output: &Output) -> ScmResult<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(ScmError::Command {
        command: command.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

fn head(workdir: &Path) -> ScmResult<CommitId> {
    Ok(CommitId::new(run_git_stdout(workdir, &["rev-parse", "HEAD"])?))
}

/// Fetches the landing branch from the pull path. Failures that look like
/// server or network trouble map to `InternalServerError` so the attempt
/// defers instead of failing outright.
fn fetch(workdir: &Path, pull_path: &str, branch: &str) -> ScmResult<()> {
    let output = git_command(workdir)
        .args(["fetch", pull_path, branch])
        .output()?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if stderr_is_transient(&stderr) {
        return Err(ScmError::InternalServerError { details: stderr });
    }
    Err(ScmError::Command {
        command: format!("git fetch {} {}", pull_path, branch),
        stderr,
    })
}

/// Applies a diff to the index and working tree via stdin.
fn apply_diff(workdir: &Path, diff: &str) -> ScmResult<()> {
    let mut child = git_command(workdir)
        .args(["apply", "--index"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    // The child exits on malformed input, so a write error here just means
    // it already gave up; the status check below reports the real cause.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(diff.as_bytes());
    }
    let output = child.wait_with_output()?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if stderr.contains("patch does not apply")
        || stderr.contains("patch failed")
        || stderr.contains("already exists in working directory")
        || stderr.contains("does not exist in index")
    {
        return Err(ScmError::PatchConflict {
            failed_paths: apply_failure_paths(&stderr),
            rejects: Some(stderr),
        });
    }
    Err(ScmError::Command {
        command: "git apply --index".to_string(),
        stderr,
    })
}

/// Extracts the paths `git apply` complains about.
///
/// Lines look like `error: patch failed: path/file.txt:12` or
/// `error: path/file.txt: patch does not apply`.
fn apply_failure_paths(stderr: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in stderr.lines() {
        let Some(rest) = line.strip_prefix("error: ") else {
            continue;
        };
        let path = match rest.strip_prefix("patch failed: ") {
            Some(located) => located.rsplit_once(':').map(|(path, _line)| path),
            None => rest.split_once(": ").map(|(path, _reason)| path),
        };
        if let Some(path) = path {
            let path = path.to_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Extracts conflicting paths from `git merge` output.
///
/// Lines look like `CONFLICT (content): Merge conflict in path/file.txt`.
fn conflict_paths(stdout: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in stdout.lines() {
        if !line.starts_with("CONFLICT") {
            continue;
        }
        if let Some((_prefix, path)) = line.rsplit_once(" in ") {
            let path = path.to_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

fn stderr_is_transient(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    [
        "could not resolve",
        "unable to access",
        "connection refused",
        "connection reset",
        "connection timed out",
        "remote end hung up",
        "early eof",
        "internal server error",
        "502",
        "503",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

/// Maps a failed push onto the error taxonomy.
///
/// Hook-enforced rejections (closed tree, approval) arrive as `remote:`
/// lines in stderr; races show up as non-fast-forward rejections.
fn classify_push_failure(push_path: &str, stderr: String) -> ScmError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("tree is closed") || lowered.contains("tree closed") {
        return ScmError::TreeClosed { details: stderr };
    }
    if lowered.contains("approval required") {
        return ScmError::ApprovalRequired { details: stderr };
    }
    if lowered.contains("non-fast-forward")
        || lowered.contains("fetch first")
        || lowered.contains("stale info")
        || lowered.contains("[rejected]")
    {
        return ScmError::LostPushRace { details: stderr };
    }
    if lowered.contains("timed out") || lowered.contains("operation too slow") {
        return ScmError::PushTimeout { details: stderr };
    }
    if stderr_is_transient(&stderr) {
        return ScmError::InternalServerError { details: stderr };
    }
    ScmError::Command {
        command: format!("git push {}", push_path),
        stderr,
    }
}
