//! Shared progress markers written by the renderer's block hooks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::time::Instant;

/// Hook pair invoked by a renderer around every renderable block.
pub trait BlockHooks: Send + Sync {
    /// Runs before any post-processing of a block.
    fn on_block_enter(&self);

    /// Runs after every post-processor has finished with the block.
    fn on_block_leave(&self);
}

/// Per-conversion render state: whether a block is being processed and when the last one ended.
///
/// Timestamps are stored as microseconds since the state was created, offset by one so
/// that zero can mean "no block has finished yet".
#[derive(Debug)]
pub struct RenderState {
    epoch: Instant,
    processing: AtomicBool,
    last_finished: AtomicU64,
}

impl RenderState {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            processing: AtomicBool::new(false),
            last_finished: AtomicU64::new(0),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// `None` until the first block has finished.
    pub fn last_block_finished_at(&self) -> Option<Instant> {
        match self.last_finished.load(Ordering::Acquire) {
            0 => None,
            offset => Some(self.epoch + std::time::Duration::from_micros(offset - 1)),
        }
    }

    fn mark_finished(&self) {
        let micros = Instant::now().duration_since(self.epoch).as_micros();
        let offset = u64::try_from(micros).unwrap_or(u64::MAX - 1) + 1;
        self.last_finished.store(offset, Ordering::Release);
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockHooks for RenderState {
    fn on_block_enter(&self) {
        self.processing.store(true, Ordering::Release);
    }

    fn on_block_leave(&self) {
        self.mark_finished();
        self.processing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn hooks_track_processing_and_last_finish() {
        let state = RenderState::new();
        assert!(!state.is_processing());
        assert!(state.last_block_finished_at().is_none());

        state.on_block_enter();
        assert!(state.is_processing());
        assert!(state.last_block_finished_at().is_none());

        tokio::time::sleep(Duration::from_millis(15)).await;
        state.on_block_leave();
        assert!(!state.is_processing());
        let finished = state.last_block_finished_at().expect("finished");
        assert_eq!(finished, Instant::now());
    }
}
