//! Periodic snapshot broadcast
//!
//! At most one schedule runs per scheduler. Each tick checks the registry
//! first: with no clients connected the snapshot source is not called at all.
//!
//! Ticks never overlap. The source is awaited inside the tick, and ticks
//! that come due while it is still running are skipped, not queued.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::core::{current_time_ms, SnapshotSource};
use crate::error::AppError;

use super::registry::ClientRegistry;

/// Envelope `type` of periodic messages
pub const UPDATE_MESSAGE_TYPE: &str = "update";

/// Build `{"type":"update","timestamp":..,"data":..}`.
pub fn update_envelope(timestamp_ms: u64, data: Value) -> Value {
    json!({
        "type": UPDATE_MESSAGE_TYPE,
        "timestamp": timestamp_ms,
        "data": data,
    })
}

struct ActiveSchedule {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    period: Duration,
}

impl ActiveSchedule {
    /// Signal the loop to exit at its next tick boundary.
    fn cancel(self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Broadcast loop already gone");
        }
        drop(self.handle);
    }
}

/// Owns the single recurring broadcast task of a server.
pub struct BroadcastScheduler {
    registry: ClientRegistry,
    active: Mutex<Option<ActiveSchedule>>,
}

impl BroadcastScheduler {
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            registry,
            active: Mutex::new(None),
        }
    }

    /// Start broadcasting `source` every `period`, replacing any running schedule.
    ///
    /// The first tick fires one full period after the call.
    pub async fn start<S: SnapshotSource>(&self, source: S, period: Duration) -> Result<(), AppError> {
        if period.is_zero() {
            return Err(AppError::Config(
                "broadcast interval must be > 0".to_string(),
            ));
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(previous_ms = previous.period.as_millis() as u64, "Replacing broadcast schedule");
            previous.cancel();
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_schedule(
            self.registry.clone(),
            Arc::new(source),
            period,
            shutdown_rx,
        ));

        info!(interval_ms = period.as_millis() as u64, "Broadcast schedule started");
        *active = Some(ActiveSchedule {
            shutdown_tx,
            handle,
            period,
        });

        Ok(())
    }

    /// Cancel the running schedule, if any.
    ///
    /// A tick already in flight finishes. Returns `false` when nothing was
    /// running.
    pub async fn stop(&self) -> bool {
        match self.active.lock().await.take() {
            Some(schedule) => {
                schedule.cancel();
                info!("Broadcast schedule stopped");
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }
}

async fn run_schedule(
    registry: ClientRegistry,
    source: Arc<dyn SnapshotSource>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Broadcast loop exiting");
                break;
            }
            _ = ticker.tick() => {
                run_tick(&registry, source.as_ref()).await;
            }
        }
    }
}

/// One scheduler tick. Returns `true` if an update was broadcast.
pub(crate) async fn run_tick(registry: &ClientRegistry, source: &dyn SnapshotSource) -> bool {
    if registry.is_empty().await {
        trace!("No clients connected, skipping tick");
        return false;
    }

    let timestamp = current_time_ms();
    let data = match AssertUnwindSafe(source.snapshot()).catch_unwind().await {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => {
            warn!(error = %e, "Snapshot source failed, skipping tick");
            return false;
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(panic = %msg, "Snapshot source panicked, skipping tick");
            return false;
        }
    };

    let delivered = registry.broadcast(update_envelope(timestamp, data)).await;
    trace!(delivered, "Update broadcast");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::server::registry::tests::RecordingSink;
    use crate::server::registry::Client;

    const PERIOD: Duration = Duration::from_millis(5_000);

    /// Counts calls and returns `{"hashRate": 42}`.
    #[derive(Clone, Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn snapshot(&self) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"hashRate": 42}))
        }
    }

    struct FailingSource {
        calls: Arc<AtomicUsize>,
        panic: bool,
    }

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn snapshot(&self) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("miner API exploded");
            }
            anyhow::bail!("miner API unreachable")
        }
    }

    async fn connect(registry: &ClientRegistry) -> RecordingSink {
        let sink = RecordingSink::default();
        let id = registry.allocate_id();
        registry
            .add(Arc::new(Client::new(id, None, Box::new(sink.clone()))))
            .await;
        sink
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_snapshot_without_clients() {
        let registry = ClientRegistry::new();
        let scheduler = BroadcastScheduler::new(registry);
        let source = CountingSource::default();

        scheduler.start(source.clone(), PERIOD).await.unwrap();
        tokio::time::sleep(PERIOD * 10 + Duration::from_millis(1)).await;

        assert_eq!(source.calls(), 0);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_tick_delivers_one_update() {
        let registry = ClientRegistry::new();
        let sink = connect(&registry).await;
        let scheduler = BroadcastScheduler::new(registry);

        scheduler.start(|| json!({"hashRate": 42}), PERIOD).await.unwrap();
        tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        let message: Value = serde_json::from_str(&texts[0]).unwrap();
        assert_eq!(message["type"], "update");
        assert!(message["timestamp"].is_u64());
        assert_eq!(message["data"], json!({"hashRate": 42}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_schedule() {
        let registry = ClientRegistry::new();
        connect(&registry).await;
        let scheduler = BroadcastScheduler::new(registry);
        let first = CountingSource::default();
        let second = CountingSource::default();

        scheduler.start(first.clone(), PERIOD).await.unwrap();
        scheduler.start(second.clone(), PERIOD).await.unwrap();
        tokio::time::sleep(PERIOD * 3 + Duration::from_millis(1)).await;

        assert_eq!(first.calls(), 0);
        assert_eq!(second.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_future_ticks() {
        let registry = ClientRegistry::new();
        connect(&registry).await;
        let scheduler = BroadcastScheduler::new(registry);
        let source = CountingSource::default();

        scheduler.start(source.clone(), PERIOD).await.unwrap();
        tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
        assert!(scheduler.stop().await);
        tokio::time::sleep(PERIOD * 5).await;

        assert_eq!(source.calls(), 1);
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = BroadcastScheduler::new(ClientRegistry::new());
        assert!(!scheduler.stop().await);
        assert!(!scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = BroadcastScheduler::new(ClientRegistry::new());
        let result = scheduler.start(|| 1, Duration::ZERO).await;
        assert!(matches!(result, Err(AppError::Config(_))));
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_errors_do_not_stop_schedule() {
        let registry = ClientRegistry::new();
        let sink = connect(&registry).await;
        let scheduler = BroadcastScheduler::new(registry);
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler
            .start(
                FailingSource {
                    calls: calls.clone(),
                    panic: false,
                },
                PERIOD,
            )
            .await
            .unwrap();
        tokio::time::sleep(PERIOD * 3 + Duration::from_millis(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(sink.texts().is_empty());
        assert!(scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_panicking_source_abandons_tick() {
        let registry = ClientRegistry::new();
        let sink = connect(&registry).await;
        let source = FailingSource {
            calls: Arc::new(AtomicUsize::new(0)),
            panic: true,
        };

        assert!(!run_tick(&registry, &source).await);
        assert!(!run_tick(&registry, &source).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(sink.texts().is_empty());
    }

    #[test]
    fn test_update_envelope_shape() {
        let envelope = update_envelope(1_700_000_000_000, json!({"a": 1}));
        assert_eq!(
            envelope,
            json!({"type": "update", "timestamp": 1_700_000_000_000u64, "data": {"a": 1}})
        );
    }
}
