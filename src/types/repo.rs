//! Repository registration entries from the daemon's manifest.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::RepoName;

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

/// One repository the engine may land to.
///
/// `pull_path` and `push_path` are backend URLs (often identical); they are
/// kept separate because some deployments pull from a mirror and push to the
/// canonical remote. `tree` names the tree-status entry gating the repo and
/// defaults to the repository name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub name: RepoName,

    /// Tree-status identifier; `None` means "same as `name`".
    #[serde(default)]
    pub tree: Option<String>,

    pub pull_path: String,
    pub push_path: String,

    /// Remote branch to push to; empty means the default branch.
    #[serde(default)]
    pub push_target: String,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default)]
    pub force_push: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local working-copy location for this repository.
    pub system_path: PathBuf,
}

impl RepoSpec {
    /// The tree-status entry gating this repository.
    pub fn tree_name(&self) -> &str {
        self.tree.as_deref().unwrap_or_else(|| self.name.as_str())
    }

    /// The remote ref name pushes should land on.
    pub fn push_ref(&self) -> &str {
        if self.push_target.is_empty() {
            &self.default_branch
        } else {
            &self.push_target
        }
    }
}
