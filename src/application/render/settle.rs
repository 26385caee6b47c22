//! Completion detection for renders that report progress only through block hooks.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::domain::options::SettleStrategy;

use super::state::RenderState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const DEFAULT_SETTLING_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTiming {
    pub poll_interval: Duration,
    pub settling_window: Duration,
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settling_window: DEFAULT_SETTLING_WINDOW,
        }
    }
}

/// How a render was judged complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The renderer signalled completion itself.
    Explicit,
    /// The settling window elapsed after the last block.
    Heuristic,
}

/// Wait until no block is in progress and the settling window has passed since the last one.
///
/// Returns at once when no block ever finished and none is running. A block whose leave
/// hook never fires keeps this waiting forever.
pub async fn await_settled(state: &RenderState, timing: SettleTiming) {
    let started = Instant::now();
    let mut polls = 0u32;
    loop {
        let processing = state.is_processing();
        match state.last_block_finished_at() {
            None if !processing => break,
            Some(last) if !processing && last.elapsed() >= timing.settling_window => break,
            _ => {}
        }
        polls += 1;
        sleep(timing.poll_interval).await;
    }
    debug!(
        target = "application::render::settle",
        op = "settle::heuristic",
        result = "settled",
        polls,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "render settled"
    );
}

/// Pick the completion signal according to `strategy`.
///
/// An explicit signal whose sender is dropped falls back to the heuristic.
pub async fn await_completion(
    state: &RenderState,
    timing: SettleTiming,
    strategy: SettleStrategy,
    completion: Option<oneshot::Receiver<()>>,
) -> Settled {
    if let (SettleStrategy::PreferExplicit, Some(completion)) = (strategy, completion) {
        if completion.await.is_ok() {
            return Settled::Explicit;
        }
        debug!(
            target = "application::render::settle",
            op = "settle::explicit",
            result = "dropped",
            "completion signal dropped; falling back to settling window"
        );
    }
    await_settled(state, timing).await;
    Settled::Heuristic
}
