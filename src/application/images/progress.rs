use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::debug;

/// Receives completion percentages while a batch of tasks runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

/// Logs progress at debug level.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, percent: u8) {
        debug!(
            target = "application::images",
            op = "images::progress",
            percent,
            "image tasks progress"
        );
    }
}

/// Run every future concurrently and return their outputs in input order.
///
/// Reports 0 up front, then the completed share after each task finishes.
pub async fn all_with_progress<F, T>(tasks: Vec<F>, progress: &dyn ProgressSink) -> Vec<T>
where
    F: Future<Output = T>,
{
    let total = tasks.len();
    progress.report(0);

    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| async move { (index, task.await) })
        .collect();

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut completed = 0usize;
    while let Some((index, output)) = pending.next().await {
        slots[index] = Some(output);
        completed += 1;
        progress.report((completed * 100 / total) as u8);
    }
    slots.into_iter().flatten().collect()
}
