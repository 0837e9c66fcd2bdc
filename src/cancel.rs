//! Cooperative cancellation shared between the CLI and a running pipeline

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable stop flag. Phases poll it between units of work; it never
/// interrupts a request that is already in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the flag can be reused for a new run
    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }
}
