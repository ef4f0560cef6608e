//! Worker control plane.
//!
//! Operators stop or pause workers out of band; the worker only ever reads
//! the flags. [`SharedControl`] is the in-process implementation: atomic
//! flags shared between the loop and whatever surface the operator drives
//! (signal handler, admin endpoint, test harness).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read side of the operator controls.
///
/// `is_stopped` is terminal intent: once observed, the worker winds down
/// and does not resume. `is_paused` is temporary: the worker idles without
/// claiming work until the flag clears.
pub trait ControlPlane: Send + Sync {
    fn is_stopped(&self) -> bool;
    fn is_paused(&self) -> bool;
}

/// Flag-based control plane shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct SharedControl {
    stopped: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl SharedControl {
    pub fn new() -> Self {
        SharedControl::default()
    }

    /// Ask every holder of this control to wind down.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Hold workers idle without losing claimed state.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl ControlPlane for SharedControl {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
