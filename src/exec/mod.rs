//! Execution of claimed jobs against a source-control backend.
//!
//! The pieces compose in layers. [`patch`] turns a patch envelope into
//! structured commit material. [`pipeline`] runs a whole job through pull,
//! apply, and push. [`classify`] is the pure function deciding whether a
//! failure retries (`DEFER`) or sticks (`FAIL`).

pub mod classify;
pub mod patch;
pub mod pipeline;

pub use classify::{classify, ApplyUnit, Phase, Verdict};
pub use patch::{parse_patch, Patch, PatchError};
pub use pipeline::{execute_job, JobDisposition};
