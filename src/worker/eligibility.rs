//! Repository eligibility.
//!
//! A worker only claims jobs for repositories it may land to right now:
//! the repository must be enabled in configuration and its tree must be
//! open. Tree state lives outside this process and can flip at any moment,
//! so eligibility is recomputed rather than cached across the loop.
//!
//! A tree whose status cannot be determined counts as closed until the
//! lookup succeeds again.

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::RepoSpec;

#[derive(Debug, Error)]
pub enum TreeStatusError {
    /// The status source could not be reached.
    #[error("tree status unavailable: {details}")]
    Unavailable { details: String },
}

/// Source of open/closed state for trees.
pub trait TreeStatus: Send + Sync {
    fn is_open(&self, tree: &str)
        -> impl Future<Output = Result<bool, TreeStatusError>> + Send;
}

/// Tree status backed by an in-memory table.
///
/// Trees without an entry are open. Mutations take effect for the next
/// eligibility pass.
#[derive(Debug, Default)]
pub struct StaticTreeStatus {
    trees: RwLock<HashMap<String, bool>>,
}

impl StaticTreeStatus {
    pub fn new() -> Self {
        StaticTreeStatus::default()
    }

    pub async fn set_open(&self, tree: &str, open: bool) {
        self.trees.write().await.insert(tree.to_string(), open);
    }
}

impl TreeStatus for StaticTreeStatus {
    async fn is_open(&self, tree: &str) -> Result<bool, TreeStatusError> {
        Ok(self.trees.read().await.get(tree).copied().unwrap_or(true))
    }
}

/// Filters the configured repositories down to the ones a worker may land
/// to right now.
pub async fn eligible_repos<T: TreeStatus>(
    tree_status: &T,
    applicable: &[RepoSpec],
) -> Vec<RepoSpec> {
    let mut enabled = Vec::with_capacity(applicable.len());
    for repo in applicable {
        if !repo.enabled {
            debug!(repo = %repo.name, "repository disabled in configuration");
            continue;
        }
        match tree_status.is_open(repo.tree_name()).await {
            Ok(true) => enabled.push(repo.clone()),
            Ok(false) => {
                debug!(repo = %repo.name, tree = repo.tree_name(), "tree is closed");
            }
            Err(status_error) => {
                warn!(
                    repo = %repo.name,
                    tree = repo.tree_name(),
                    error = %status_error,
                    "could not determine tree status, treating tree as closed",
                );
            }
        }
    }
    enabled
}
