//! Engine entry point.
//!
//! Loads configuration, prepares a working copy per repository, and runs a
//! landing worker until the process is asked to shut down.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoland::config::EngineConfig;
use autoland::notify::LoggingNotifier;
use autoland::queue::MemoryJobStore;
use autoland::scm::{CommitIdentity, GitScm};
use autoland::worker::{LandingWorker, SharedControl, StaticTreeStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoland=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::load().context("loading configuration")?;

    let identity = CommitIdentity::from_env();
    let mut repos = Vec::with_capacity(config.repos.len());
    for spec in &config.repos {
        let scm = GitScm::new(spec.clone(), identity.clone());
        scm.prepare()
            .await
            .with_context(|| format!("preparing working copy for {}", spec.name))?;
        repos.push((spec.clone(), Arc::new(scm)));
    }

    let store = Arc::new(MemoryJobStore::new());
    let control = SharedControl::new();
    let tree_status = Arc::new(StaticTreeStatus::new());
    let shutdown = CancellationToken::new();

    let worker = LandingWorker::new(
        config.worker.clone(),
        store,
        Arc::new(LoggingNotifier),
        tree_status,
        Arc::new(control.clone()),
        shutdown.clone(),
        repos,
    );
    let worker_handle = tokio::spawn(worker.run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested, stopping the landing worker");
    control.stop();
    shutdown.cancel();
    worker_handle.await.context("joining the landing worker")?;

    Ok(())
}
