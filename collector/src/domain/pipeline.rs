//! Unit State Dispatch Loop
//!
//! Consumes bus notifications and transport errors, turns state changes into
//! points and writes them to the metrics store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::persist::persist_batch;
use super::point::build_point;
use super::stats::PipelineStats;
use super::types::{Batch, ChangeNotification, Destination};
use crate::core::config::PipelineConfig;
use crate::core::constants::SHUTDOWN_DRAIN_BUDGET_SECS;
use crate::data::bus::BusError;
use crate::data::store::MetricStore;

pub struct DispatchLoop {
    store: Arc<dyn MetricStore>,
    destination: Destination,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    pending: Batch,
    shutdown: Option<watch::Receiver<bool>>,
    /// Set when shutdown is first observed; writes stop at this instant
    drain_deadline: Option<Instant>,
}

impl DispatchLoop {
    pub fn new(
        store: Arc<dyn MetricStore>,
        destination: Destination,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let pending = Batch::new(destination.clone());
        Self {
            store,
            destination,
            config,
            stats,
            pending,
            shutdown: None,
            drain_deadline: None,
        }
    }

    pub fn start(
        self,
        updates: mpsc::Receiver<ChangeNotification>,
        errors: mpsc::Receiver<BusError>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(updates, errors, shutdown_rx))
    }

    /// Run until shutdown is signalled or the notification channel closes.
    ///
    /// On shutdown the notification channel is closed to the producer and
    /// whatever is already queued is processed before returning. Writes get
    /// `SHUTDOWN_DRAIN_BUDGET_SECS` from the moment shutdown is seen; points
    /// not written by then are counted as dropped.
    pub async fn run(
        mut self,
        mut updates: mpsc::Receiver<ChangeNotification>,
        mut errors: mpsc::Receiver<BusError>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let period = Duration::from_millis(self.config.flush_interval_ms.max(1));
        let mut flush_timer = tokio::time::interval_at(Instant::now() + period, period);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let coalescing = self.config.batch_size > 1;
        let mut errors_open = true;
        self.shutdown = Some(shutdown_rx.clone());

        tracing::debug!(
            batch_size = self.config.batch_size,
            database = %self.destination.database,
            "Dispatch loop started"
        );

        // No bias: a notification and an error that race are taken in either order
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Dispatch loop received shutdown, draining...");
                        self.drain_deadline.get_or_insert_with(drain_deadline_from_now);
                        self.drain(&mut updates).await;
                        break;
                    }
                }
                received = updates.recv() => match received {
                    Some(notification) => self.handle_notification(notification).await,
                    None => {
                        tracing::debug!("Notification channel closed");
                        break;
                    }
                },
                received = errors.recv(), if errors_open => match received {
                    Some(error) => self.handle_transport_error(&error),
                    None => errors_open = false,
                },
                _ = flush_timer.tick(), if coalescing => self.flush().await,
            }
        }

        while let Ok(error) = errors.try_recv() {
            self.handle_transport_error(&error);
        }
        self.flush().await;

        let stats = self.stats.snapshot();
        tracing::info!(
            notifications = stats.notifications_received,
            points_written = stats.points_written,
            unrecognized_states = stats.unrecognized_states,
            transport_errors = stats.transport_errors,
            batches_dropped = stats.batches_dropped,
            "Dispatch loop stopped"
        );
    }

    async fn drain(&mut self, updates: &mut mpsc::Receiver<ChangeNotification>) {
        updates.close();
        let mut drained = 0usize;
        while let Some(notification) = updates.recv().await {
            self.handle_notification(notification).await;
            drained += 1;
        }
        tracing::debug!(drained, "Drained queued notifications");
    }

    async fn handle_notification(&mut self, notification: ChangeNotification) {
        self.stats.record_notification();

        let now = match notification.event_time {
            Some(event_time) if self.config.use_event_time => event_time,
            _ => Utc::now(),
        };

        match build_point(&notification, now) {
            Ok(Some(point)) => {
                self.stats.record_point();
                tracing::debug!(
                    unit = %notification.unit_name,
                    fields = ?point.fields,
                    "Unit state changed"
                );
                self.pending.points.push(point);
                if self.pending.len() >= self.config.batch_size {
                    self.flush().await;
                }
            }
            Ok(None) => {
                self.stats.record_ignored();
                tracing::trace!(
                    unit = %notification.unit_name,
                    "Notification without ActiveState, ignoring"
                );
            }
            Err(e) => {
                self.stats.record_unrecognized_state();
                tracing::warn!(
                    unit = %notification.unit_name,
                    error = %e,
                    "Skipping notification"
                );
            }
        }
    }

    fn handle_transport_error(&self, error: &BusError) {
        self.stats.record_transport_error();
        tracing::warn!(error = %error, "Bus transport error");
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.pending, Batch::new(self.destination.clone()));

        let Self {
            store,
            config,
            stats,
            shutdown,
            drain_deadline,
            ..
        } = self;

        let cut_off = async {
            let deadline = match *drain_deadline {
                Some(deadline) => deadline,
                None => {
                    match shutdown.as_mut() {
                        // A closed sender counts as shutdown
                        Some(rx) => {
                            let _ = rx.wait_for(|&stop| stop).await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                    *drain_deadline.get_or_insert_with(drain_deadline_from_now)
                }
            };
            tokio::time::sleep_until(deadline).await;
        };

        persist_batch(
            &batch,
            store.as_ref(),
            config.write_max_attempts,
            config.write_base_delay_ms,
            stats,
            cut_off,
        )
        .await;
    }
}

fn drain_deadline_from_now() -> Instant {
    Instant::now() + Duration::from_secs(SHUTDOWN_DRAIN_BUDGET_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{
        PROP_ACTIVE_STATE, SHUTDOWN_TIMEOUT_SECS, STORE_REQUEST_TIMEOUT_SECS,
    };
    use crate::data::store::WriteError;
    use crate::domain::types::{FieldValue, PropertyValue};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records every batch; fails the first `fail_first` calls
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Batch>>,
        calls: AtomicU32,
        fail_first: u32,
    }

    impl RecordingStore {
        fn failing(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                ..Default::default()
            })
        }

        fn batches(&self) -> Vec<Batch> {
            self.batches.lock().unwrap().clone()
        }

        fn values(&self) -> Vec<i64> {
            self.batches()
                .iter()
                .flat_map(|b| b.points.iter())
                .map(|p| match p.fields.get("value") {
                    Some(FieldValue::Integer(v)) => *v,
                    other => panic!("missing value field: {:?}", other),
                })
                .collect()
        }
    }

    #[async_trait]
    impl MetricStore for RecordingStore {
        async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                return Err(WriteError::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    struct Harness {
        updates: mpsc::Sender<ChangeNotification>,
        errors: mpsc::Sender<BusError>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
        stats: Arc<PipelineStats>,
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            write_base_delay_ms: 1,
            ..PipelineConfig::default()
        }
    }

    fn spawn_loop(store: Arc<RecordingStore>, config: PipelineConfig) -> Harness {
        let (updates, updates_rx) = mpsc::channel(config.channel_capacity);
        let (errors, errors_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = PipelineStats::new();
        let handle = DispatchLoop::new(store, Destination::default(), config, stats.clone())
            .start(updates_rx, errors_rx, shutdown_rx);
        Harness {
            updates,
            errors,
            shutdown,
            handle,
            stats,
        }
    }

    impl Harness {
        /// Close the bus side and wait for the loop to finish
        async fn finish(self) -> Arc<PipelineStats> {
            drop(self.updates);
            drop(self.errors);
            tokio::time::timeout(Duration::from_secs(5), self.handle)
                .await
                .expect("dispatch loop did not stop")
                .unwrap();
            drop(self.shutdown);
            self.stats
        }
    }

    fn state_change(unit: &str, state: &str) -> ChangeNotification {
        ChangeNotification::new(unit)
            .with_property(PROP_ACTIVE_STATE, PropertyValue::new(format!("\"{}\"", state)))
    }

    #[tokio::test]
    async fn test_end_to_end_writes_in_order() {
        let store = Arc::new(RecordingStore::default());
        let harness = spawn_loop(store.clone(), test_config());

        for state in ["activating", "active", "failed"] {
            harness.updates.send(state_change("a.service", state)).await.unwrap();
        }
        let stats = harness.finish().await;

        let batches = store.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(store.values(), vec![4, 1, -1]);
        for batch in &batches {
            assert_eq!(batch.len(), 1);
            assert_eq!(batch.destination, Destination::default());
            assert_eq!(
                batch.points[0].tags.get("service").map(String::as_str),
                Some("a.service")
            );
        }
        assert_eq!(stats.snapshot().batches_written, 3);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_stop_processing() {
        let store = Arc::new(RecordingStore::default());
        let harness = spawn_loop(store.clone(), test_config());

        harness
            .errors
            .send(BusError::Signal("connection reset".to_string()))
            .await
            .unwrap();
        harness
            .updates
            .send(state_change("nginx.service", "active"))
            .await
            .unwrap();
        let stats = harness.finish().await.snapshot();

        assert_eq!(store.values(), vec![1]);
        assert_eq!(stats.transport_errors, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_state_is_skipped() {
        let store = Arc::new(RecordingStore::default());
        let harness = spawn_loop(store.clone(), test_config());

        harness.updates.send(state_change("a.service", "bogus")).await.unwrap();
        harness.updates.send(state_change("b.service", "inactive")).await.unwrap();
        let stats = harness.finish().await.snapshot();

        assert_eq!(store.values(), vec![0]);
        assert_eq!(stats.unrecognized_states, 1);
        assert_eq!(stats.notifications_received, 2);
    }

    #[tokio::test]
    async fn test_notification_without_state_is_ignored() {
        let store = Arc::new(RecordingStore::default());
        let harness = spawn_loop(store.clone(), test_config());

        let other = ChangeNotification::new("a.service")
            .with_property("SubState", PropertyValue::new("\"running\""));
        harness.updates.send(other).await.unwrap();
        let stats = harness.finish().await.snapshot();

        assert!(store.batches().is_empty());
        assert_eq!(stats.notifications_ignored, 1);
    }

    #[tokio::test]
    async fn test_transient_write_failure_is_retried() {
        let store = RecordingStore::failing(1);
        let harness = spawn_loop(store.clone(), test_config());

        harness.updates.send(state_change("a.service", "active")).await.unwrap();
        let stats = harness.finish().await.snapshot();

        assert_eq!(store.values(), vec![1]);
        assert_eq!(stats.write_retries, 1);
        assert_eq!(stats.batches_dropped, 0);
    }

    #[tokio::test]
    async fn test_persistent_write_failure_drops_and_continues() {
        let store = RecordingStore::failing(2);
        let config = PipelineConfig {
            write_max_attempts: 2,
            ..test_config()
        };
        let harness = spawn_loop(store.clone(), config);

        harness.updates.send(state_change("a.service", "failed")).await.unwrap();
        harness.updates.send(state_change("a.service", "active")).await.unwrap();
        let stats = harness.finish().await.snapshot();

        // First batch used both attempts and was dropped; the second went through
        assert_eq!(store.values(), vec![1]);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.points_dropped, 1);
        assert_eq!(stats.batches_written, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_notifications() {
        let store = Arc::new(RecordingStore::default());
        let config = test_config();
        let (updates, updates_rx) = mpsc::channel(config.channel_capacity);
        let (_errors, errors_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        for state in ["activating", "active", "deactivating"] {
            updates.send(state_change("a.service", state)).await.unwrap();
        }
        shutdown.send(true).unwrap();

        let handle = DispatchLoop::new(
            store.clone(),
            Destination::default(),
            config,
            PipelineStats::new(),
        )
        .start(updates_rx, errors_rx, shutdown_rx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatch loop did not stop on shutdown")
            .unwrap();

        assert_eq!(store.values(), vec![4, 1, 5]);
        // Producer side is closed after drain
        assert!(updates.send(state_change("a.service", "failed")).await.is_err());
    }

    #[tokio::test]
    async fn test_coalesces_points_into_batches() {
        let store = Arc::new(RecordingStore::default());
        let config = PipelineConfig {
            batch_size: 2,
            flush_interval_ms: 60_000,
            ..test_config()
        };
        let harness = spawn_loop(store.clone(), config);

        for state in ["activating", "active", "reloading"] {
            harness.updates.send(state_change("a.service", state)).await.unwrap();
        }
        harness.finish().await;

        let sizes: Vec<usize> = store.batches().iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(store.values(), vec![4, 1, 2]);
    }

    #[tokio::test]
    async fn test_flush_timer_writes_partial_batch() {
        let store = Arc::new(RecordingStore::default());
        let config = PipelineConfig {
            batch_size: 100,
            flush_interval_ms: 20,
            ..test_config()
        };
        let harness = spawn_loop(store.clone(), config);

        harness.updates.send(state_change("a.service", "active")).await.unwrap();

        let flushed = tokio::time::timeout(Duration::from_secs(5), async {
            while store.batches().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(flushed.is_ok(), "partial batch was not flushed by the timer");
        assert_eq!(store.values(), vec![1]);

        harness.finish().await;
    }

    #[tokio::test]
    async fn test_event_time_preferred_when_enabled() {
        let event_time = Utc.timestamp_millis_opt(1_704_067_200_250).unwrap();

        let store = Arc::new(RecordingStore::default());
        let harness = spawn_loop(store.clone(), test_config());
        harness
            .updates
            .send(state_change("a.service", "active").with_event_time(event_time))
            .await
            .unwrap();
        harness.finish().await;
        assert_eq!(store.batches()[0].points[0].timestamp, event_time);

        let store = Arc::new(RecordingStore::default());
        let config = PipelineConfig {
            use_event_time: false,
            ..test_config()
        };
        let harness = spawn_loop(store.clone(), config);
        harness
            .updates
            .send(state_change("a.service", "active").with_event_time(event_time))
            .await
            .unwrap();
        harness.finish().await;
        assert!(store.batches()[0].points[0].timestamp > event_time);
    }

    #[tokio::test]
    async fn test_full_channel_applies_backpressure() {
        let (updates, updates_rx) = mpsc::channel(2);
        updates.try_send(state_change("a.service", "active")).unwrap();
        updates.try_send(state_change("a.service", "active")).unwrap();

        assert!(matches!(
            updates.try_send(state_change("a.service", "failed")),
            Err(mpsc::error::TrySendError::Full(_))
        ));
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            updates.send(state_change("a.service", "failed")),
        )
        .await;
        assert!(blocked.is_err(), "send on a full channel should wait");

        // Once the loop drains the channel the producer proceeds
        let store = Arc::new(RecordingStore::default());
        let (_errors, errors_rx) = mpsc::channel(2);
        let (_shutdown, shutdown_rx) = watch::channel(false);
        let handle = DispatchLoop::new(
            store.clone(),
            Destination::default(),
            test_config(),
            PipelineStats::new(),
        )
        .start(updates_rx, errors_rx, shutdown_rx);

        tokio::time::timeout(
            Duration::from_secs(5),
            updates.send(state_change("a.service", "failed")),
        )
        .await
        .expect("producer stayed blocked")
        .unwrap();
        drop(updates);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.values(), vec![1, 1, -1]);
    }

    /// Every write hangs for the store request timeout, then fails
    #[derive(Default)]
    struct HungStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MetricStore for HungStore {
        async fn write(&self, _batch: &Batch) -> Result<(), WriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(STORE_REQUEST_TIMEOUT_SECS)).await;
            Err(WriteError::Rejected {
                status: 504,
                body: "timeout".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_off_retries_and_counts_drop() {
        let store = Arc::new(HungStore::default());
        let (updates, updates_rx) = mpsc::channel(8);
        let (_errors, errors_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = PipelineStats::new();
        let handle = DispatchLoop::new(
            store.clone(),
            Destination::default(),
            PipelineConfig::default(),
            stats.clone(),
        )
        .start(updates_rx, errors_rx, shutdown_rx);

        updates.send(state_change("a.service", "active")).await.unwrap();
        while store.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let started = Instant::now();
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), handle)
            .await
            .expect("dispatch loop outlived the shutdown timeout")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(SHUTDOWN_TIMEOUT_SECS));

        let stats = stats.snapshot();
        assert_eq!(stats.points_built, 1);
        assert_eq!(stats.points_written, 0);
        assert_eq!(stats.points_dropped, 1);
        assert_eq!(stats.batches_dropped, 1);
        // The first attempt never finished, so no retry was started
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_queued_past_drain_deadline_are_dropped() {
        let store = Arc::new(HungStore::default());
        let config = PipelineConfig::default();
        let (updates, updates_rx) = mpsc::channel(config.channel_capacity);
        let (_errors, errors_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = PipelineStats::new();

        for state in ["activating", "active", "failed"] {
            updates.send(state_change("a.service", state)).await.unwrap();
        }
        shutdown.send(true).unwrap();

        let started = Instant::now();
        let handle = DispatchLoop::new(store.clone(), Destination::default(), config, stats.clone())
            .start(updates_rx, errors_rx, shutdown_rx);
        tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), handle)
            .await
            .expect("dispatch loop outlived the shutdown timeout")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(SHUTDOWN_TIMEOUT_SECS));

        let stats = stats.snapshot();
        assert_eq!(stats.points_built, 3);
        assert_eq!(stats.points_written + stats.points_dropped, stats.points_built);
        assert_eq!(stats.batches_dropped, 3);
    }
}
