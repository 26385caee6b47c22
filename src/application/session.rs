//! Single-flight guard: at most one conversion runs at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default, Clone)]
pub struct ConversionLock {
    busy: Arc<AtomicBool>,
}

impl ConversionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` while another conversion holds it. Never waits.
    pub fn try_acquire(&self) -> Option<ConversionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ConversionGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the lock when dropped, on every exit path.
#[derive(Debug)]
pub struct ConversionGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
