//! The landing worker: claims queued jobs and drives them to a terminal
//! status.
//!
//! A deployment runs one worker per queue kind. Each worker serves a fixed
//! set of configured repositories and loops: check the operator controls,
//! recompute which repositories are eligible, claim the queue head, execute
//! it through the pipeline. The loop is deliberately boring; anything
//! interesting (classification, retries, status transitions) happens in
//! [`crate::exec`] and [`crate::queue`].
//!
//! # Module structure
//!
//! - [`control`]: operator stop/pause flags
//! - [`settings`]: loop tuning, from the environment
//! - [`eligibility`]: enabled-repo and tree-status filtering
//! - [`worker`]: the loop itself

pub mod control;
pub mod eligibility;
pub mod settings;
pub mod worker;


pub use control::{ControlPlane, SharedControl};
pub use eligibility::{eligible_repos, StaticTreeStatus, TreeStatus, TreeStatusError};
pub use settings::WorkerSettings;
pub use worker::LandingWorker;
