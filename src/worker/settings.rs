//! Worker tuning knobs.

use std::time::Duration;

use crate::queue::DEFAULT_GRACE_SECONDS;

/// Default idle sleep between queue polls (10 seconds).
const DEFAULT_SLEEP_SECONDS: u64 = 10;

/// Settings for one worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Name used in logs to tell workers apart.
    pub name: String,

    /// How long the worker idles when there is nothing to do.
    ///
    /// Default: 10 seconds. Configure via `AUTOLAND_SLEEP_SECONDS`.
    pub sleep: Duration,

    /// How long a deferred job is held out of the queue before it becomes
    /// claimable again.
    ///
    /// Default: 60 seconds. Configure via `AUTOLAND_GRACE_SECONDS`.
    pub grace: Duration,

    /// Stop after this many loop iterations. `None` runs until stopped.
    pub max_loops: Option<u64>,
}

impl WorkerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        WorkerSettings {
            name: name.into(),
            sleep: Duration::from_secs(DEFAULT_SLEEP_SECONDS),
            grace: Duration::from_secs(DEFAULT_GRACE_SECONDS),
            max_loops: None,
        }
    }

    /// Builds settings from environment variables.
    ///
    /// Reads `AUTOLAND_WORKER_NAME`, `AUTOLAND_SLEEP_SECONDS`, and
    /// `AUTOLAND_GRACE_SECONDS`. Missing or unparsable values fall back to
    /// defaults.
    pub fn from_env() -> Self {
        let name = std::env::var("AUTOLAND_WORKER_NAME")
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "landing-worker".to_string());

        let sleep_secs = std::env::var("AUTOLAND_SLEEP_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SLEEP_SECONDS);

        let grace_secs = std::env::var("AUTOLAND_GRACE_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_GRACE_SECONDS);

        WorkerSettings {
            sleep: Duration::from_secs(sleep_secs),
            grace: Duration::from_secs(grace_secs),
            ..Self::new(name)
        }
    }

    /// Caps the loop count, for one-shot runs and tests.
    pub fn with_max_loops(mut self, max_loops: u64) -> Self {
        self.max_loops = Some(max_loops);
        self
    }
}
