//! Pipeline counters

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters updated by the dispatch loop
#[derive(Debug, Default)]
pub struct PipelineStats {
    notifications_received: AtomicU64,
    notifications_ignored: AtomicU64,
    points_built: AtomicU64,
    unrecognized_states: AtomicU64,
    transport_errors: AtomicU64,
    batches_written: AtomicU64,
    points_written: AtomicU64,
    write_retries: AtomicU64,
    batches_dropped: AtomicU64,
    points_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub notifications_received: u64,
    pub notifications_ignored: u64,
    pub points_built: u64,
    pub unrecognized_states: u64,
    pub transport_errors: u64,
    pub batches_written: u64,
    pub points_written: u64,
    pub write_retries: u64,
    pub batches_dropped: u64,
    pub points_dropped: u64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_notification(&self) {
        self.notifications_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.notifications_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_point(&self) {
        self.points_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrecognized_state(&self) {
        self.unrecognized_states.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful write that took `attempts` tries
    pub fn record_written(&self, points: usize, attempts: u32) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.points_written
            .fetch_add(points as u64, Ordering::Relaxed);
        self.write_retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    /// Record a batch given up on after `attempts` tries
    pub fn record_dropped(&self, points: usize, attempts: u32) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.points_dropped
            .fetch_add(points as u64, Ordering::Relaxed);
        self.write_retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_ignored: self.notifications_ignored.load(Ordering::Relaxed),
            points_built: self.points_built.load(Ordering::Relaxed),
            unrecognized_states: self.unrecognized_states.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
        }
    }
}
