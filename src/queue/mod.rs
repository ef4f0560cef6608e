//! Job queue: status transitions, queue ordering, and the store boundary.
//!
//! The queue is not a standing structure. It is a filtered, ordered view
//! over landing job rows in the store:
//!
//! - [`transitions`]: which status verbs are legal from which status, and
//!   the field effects of applying them.
//! - [`select`]: queue membership and ordering (`IN_PROGRESS` first, then
//!   creation order, with a grace period for fresh deferrals).
//! - [`store`]: the transactional store trait workers consume, plus the
//!   in-memory reference implementation.

pub mod select;
pub mod store;
pub mod transitions;

pub use select::{in_queue, job_queue_query, queue_position, DEFAULT_GRACE_SECONDS};
pub use store::{JobStore, MemoryJobStore, NewJob, QueueError, QueueResult};
pub use transitions::{transition, JobVerb, TransitionError};
