//! autoland: a queued landing-job engine.
//!
//! Jobs are submitted by an external API surface, queued in a transactional
//! store, and claimed by long-running workers that pull the target repository,
//! apply the job's work (patches or typed actions), push, and record the
//! landed commit. Transient failures defer the job for a later retry;
//! permanent failures finish it with an error message.

pub mod config;
pub mod exec;
pub mod notify;
pub mod queue;
pub mod scm;
pub mod types;
pub mod worker;

#[cfg(test)]
pub mod test_utils;
