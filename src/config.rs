//! Engine configuration.
//!
//! Repositories come from a JSON manifest, a list of [`RepoSpec`] entries,
//! named by the `AUTOLAND_REPOS_FILE` environment variable. Worker tuning
//! comes straight from the environment. Nothing in here is global: the
//! loaded [`EngineConfig`] is handed to the components that need it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::types::RepoSpec;
use crate::worker::WorkerSettings;

/// Environment variable naming the repository manifest.
pub const REPOS_FILE_VAR: &str = "AUTOLAND_REPOS_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("repository manifest {path} lists no repositories")]
    EmptyManifest { path: PathBuf },

    #[error("repository {0} appears more than once in the manifest")]
    DuplicateRepo(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the engine needs to start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub repos: Vec<RepoSpec>,
    pub worker: WorkerSettings,
}

impl EngineConfig {
    /// Loads configuration from the environment.
    pub fn load() -> ConfigResult<Self> {
        let manifest =
            std::env::var(REPOS_FILE_VAR).map_err(|_| ConfigError::MissingVar(REPOS_FILE_VAR))?;
        let repos = load_repos(Path::new(&manifest))?;
        Ok(EngineConfig {
            repos,
            worker: WorkerSettings::from_env(),
        })
    }
}

/// Reads and validates a repository manifest.
pub fn load_repos(path: &Path) -> ConfigResult<Vec<RepoSpec>> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let repos: Vec<RepoSpec> =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if repos.is_empty() {
        return Err(ConfigError::EmptyManifest {
            path: path.to_path_buf(),
        });
    }
    let mut seen = HashSet::new();
    for repo in &repos {
        if !seen.insert(repo.name.clone()) {
            return Err(ConfigError::DuplicateRepo(repo.name.to_string()));
        }
    }

    debug!(path = %path.display(), repos = repos.len(), "loaded repository manifest");
    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repos.json");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn manifest_defaults_are_filled_in() {
        let (_dir, path) = write_manifest(
            r#"[
                {
                    "name": "alpha",
                    "pull_path": "https://vcs.example.test/alpha",
                    "push_path": "ssh://vcs.example.test/alpha",
                    "system_path": "/var/lib/autoland/alpha"
                },
                {
                    "name": "beta",
                    "tree": "shared",
                    "pull_path": "https://vcs.example.test/beta",
                    "push_path": "ssh://vcs.example.test/beta",
                    "push_target": "release",
                    "force_push": true,
                    "enabled": false,
                    "system_path": "/var/lib/autoland/beta"
                }
            ]"#,
        );

        let repos = load_repos(&path).unwrap();
        assert_eq!(repos.len(), 2);

        let alpha = &repos[0];
        assert_eq!(alpha.name.as_str(), "alpha");
        assert_eq!(alpha.tree_name(), "alpha");
        assert_eq!(alpha.default_branch, "main");
        assert_eq!(alpha.push_ref(), "main");
        assert!(alpha.enabled);
        assert!(!alpha.force_push);

        let beta = &repos[1];
        assert_eq!(beta.tree_name(), "shared");
        assert_eq!(beta.push_ref(), "release");
        assert!(beta.force_push);
        assert!(!beta.enabled);
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let (_dir, path) = write_manifest("[]");
        assert!(matches!(
            load_repos(&path),
            Err(ConfigError::EmptyManifest { .. }),
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (_dir, path) = write_manifest(
            r#"[
                {"name": "alpha", "pull_path": "p", "push_path": "p", "system_path": "/a"},
                {"name": "alpha", "pull_path": "p", "push_path": "p", "system_path": "/b"}
            ]"#,
        );
        assert!(matches!(
            load_repos(&path),
            Err(ConfigError::DuplicateRepo(name)) if name == "alpha",
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(load_repos(&path), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let (_dir, path) = write_manifest("{not json");
        assert!(matches!(load_repos(&path), Err(ConfigError::Parse { .. })));
    }
}
