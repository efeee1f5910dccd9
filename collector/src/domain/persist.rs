//! Batch persistence with shared retry
//!
//! Every write result is inspected. A batch that still fails after the
//! configured attempts, or is cut off by the shutdown deadline, is dropped
//! and counted.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use super::stats::PipelineStats;
use super::types::Batch;
use crate::data::store::MetricStore;
use crate::utils::retry::retry_with_backoff_async;

/// Write one batch with exponential backoff. Returns whether it was accepted.
///
/// When `cancel` resolves first, the attempt in flight is abandoned and the
/// batch is dropped.
pub async fn persist_batch<C>(
    batch: &Batch,
    store: &dyn MetricStore,
    max_attempts: u32,
    base_delay_ms: u64,
    stats: &PipelineStats,
    cancel: C,
) -> bool
where
    C: Future<Output = ()>,
{
    let point_count = batch.len();
    let attempts_made = AtomicU32::new(0);

    let retry = retry_with_backoff_async(max_attempts, base_delay_ms, || {
        attempts_made.fetch_add(1, Ordering::Relaxed);
        store.write(batch)
    });

    let result = tokio::select! {
        biased;
        _ = cancel => {
            let attempts = attempts_made.load(Ordering::Relaxed);
            stats.record_dropped(point_count, attempts);
            tracing::error!(
                points = point_count,
                attempts,
                database = %batch.destination.database,
                "Dropping batch, shutdown deadline reached before it was written"
            );
            return false;
        }
        result = retry => result,
    };

    match result {
        Ok(attempts) => {
            stats.record_written(point_count, attempts);
            if attempts > 1 {
                tracing::debug!(
                    points = point_count,
                    attempts,
                    "Wrote batch to metrics store after retry"
                );
            } else {
                tracing::trace!(points = point_count, "Wrote batch to metrics store");
            }
            true
        }
        Err((e, attempts)) => {
            stats.record_dropped(point_count, attempts);
            tracing::error!(
                error = %e,
                points = point_count,
                attempts,
                database = %batch.destination.database,
                "Dropping batch after failed writes"
            );
            false
        }
    }
}
