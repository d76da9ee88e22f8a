//! Connectivity monitoring.
//!
//! Tracks online/offline transitions reported by the platform, flushes the
//! outbox once per reconnection, and escalates prolonged outages to a
//! notification sink. On-device deviation detection never needs the network,
//! so an outage is tolerated for hours before it is surfaced at all.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::SharedClock;
use crate::config::MonitorConfig;
use crate::db::{ConnectivityRepository, SqliteConnectivityRepository};
use crate::error::Result;
use crate::models::{AlertLevel, ConnectivityState, ConnectivityStatus, OfflineAlert};
use crate::sync::SyncQueue;
use crate::util::panic_message;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Notification sink for offline alerts.
pub type AlertCallback = Arc<dyn Fn(&OfflineAlert) + Send + Sync>;

/// Cancels the periodic schedule it was returned for.
#[derive(Clone)]
pub struct MonitorHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl MonitorHandle {
    /// Stop future scheduled checks. An in-flight flush is not affected.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

struct MonitorInner {
    queue: SyncQueue,
    config: MonitorConfig,
    clock: SharedClock,
    state: Mutex<ConnectivityState>,
    on_alert: StdMutex<Option<AlertCallback>>,
    schedule: StdMutex<Option<MonitorHandle>>,
}

/// Thread-safe connectivity monitor bound to one outbox.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    /// Create a monitor for `queue`, restoring the persisted state when enabled.
    pub async fn open(queue: SyncQueue, config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let state = if config.persist_connectivity_state {
            let db = queue.database();
            let db = db.lock().await;
            let repo = SqliteConnectivityRepository::new(db.connection());
            repo.load()?.unwrap_or_default()
        } else {
            ConnectivityState::default()
        };
        if !state.is_online {
            tracing::info!(
                "Restored offline state (offline since {:?})",
                state.offline_since
            );
        }

        Ok(Self {
            inner: Arc::new(MonitorInner {
                clock: queue.clock(),
                queue,
                config,
                state: Mutex::new(state),
                on_alert: StdMutex::new(None),
                schedule: StdMutex::new(None),
            }),
        })
    }

    /// On-device analysis keeps running without connectivity.
    pub const fn can_detect_deviations_offline() -> bool {
        true
    }

    /// Current state snapshot.
    pub async fn state(&self) -> ConnectivityState {
        *self.inner.state.lock().await
    }

    /// Record a connectivity report from the platform.
    ///
    /// Returns the handle of the reconnection flush when this call was the
    /// OFFLINE to ONLINE edge, `None` otherwise.
    pub async fn update_connectivity(&self, is_online: bool) -> Option<JoinHandle<()>> {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().await;

        let reconnected = match (state.is_online, is_online) {
            (true, true) => {
                state.last_online_at = Some(now);
                false
            }
            (false, true) => {
                *state = ConnectivityState {
                    is_online: true,
                    last_online_at: Some(now),
                    offline_since: None,
                };
                true
            }
            (true, false) => {
                state.is_online = false;
                state.offline_since = Some(now);
                tracing::info!("Connectivity lost");
                false
            }
            (false, false) => return None,
        };

        self.persist(&state).await;
        drop(state);

        if reconnected {
            tracing::info!("Connectivity restored; flushing sync queue");
            Some(self.spawn_reconnect_flush())
        } else {
            None
        }
    }

    fn spawn_reconnect_flush(&self) -> JoinHandle<()> {
        let queue = self.inner.queue.clone();
        tokio::spawn(async move {
            match queue.flush().await {
                Ok(result) if result.success => {
                    tracing::debug!("Reconnection flush synced {} item(s)", result.synced_count);
                }
                Ok(result) => tracing::warn!(
                    "Reconnection flush left {} failure(s): {:?}",
                    result.failed_count,
                    result.errors
                ),
                Err(error) => tracing::warn!("Reconnection flush failed: {error}"),
            }
        })
    }

    async fn persist(&self, state: &ConnectivityState) {
        if !self.inner.config.persist_connectivity_state {
            return;
        }
        let db = self.inner.queue.database();
        let db = db.lock().await;
        let repo = SqliteConnectivityRepository::new(db.connection());
        if let Err(error) = repo.save(state) {
            tracing::warn!("Could not persist connectivity state: {error}");
        }
    }

    /// Status report as of now.
    pub async fn get_status(&self) -> ConnectivityStatus {
        let now = self.inner.clock.now_ms();
        let state = self.inner.state.lock().await;
        ConnectivityStatus {
            is_online: state.is_online,
            last_online_at: state.last_online_at,
            last_checked_at: now,
            offline_duration_ms: state.offline_duration_ms(now),
        }
    }

    /// Classify the current outage and notify the registered sink.
    ///
    /// Fires on every call while a threshold is exceeded; there is no
    /// de-duplication between checks.
    #[allow(clippy::cast_precision_loss)]
    pub async fn check_and_notify(&self) -> Result<Option<OfflineAlert>> {
        let now = self.inner.clock.now_ms();
        let offline_ms = {
            let state = self.inner.state.lock().await;
            match (state.is_online, state.offline_since) {
                (false, Some(since)) => now.saturating_sub(since),
                _ => return Ok(None),
            }
        };

        let offline_hours = offline_ms as f64 / MS_PER_HOUR;
        let offline_days = offline_hours / 24.0;
        let config = &self.inner.config;
        let level = if offline_days >= f64::from(config.critical_offline_days) {
            AlertLevel::Critical
        } else if offline_hours >= f64::from(config.prolonged_offline_hours) {
            AlertLevel::Warning
        } else {
            return Ok(None);
        };

        let pending = self.inner.queue.get_stats().await?.total_items;
        let alert = OfflineAlert::new(level, offline_hours, pending);
        tracing::warn!(
            "Offline alert {:?}: {:.1}h offline, {} item(s) pending",
            alert.level,
            alert.offline_duration_hours,
            alert.pending_sync_count
        );
        self.notify(&alert);
        Ok(Some(alert))
    }

    fn notify(&self, alert: &OfflineAlert) {
        let callback = match self.inner.on_alert.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let Some(callback) = callback else {
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(alert))) {
            tracing::warn!(
                "Offline alert callback panicked ({}); monitoring continues",
                panic_message(panic.as_ref())
            );
        }
    }

    /// Register `on_alert`, run one check now, and repeat every
    /// `check_interval`. Replaces any schedule already running.
    ///
    /// The schedule ends when it is cancelled or when the last clone of this
    /// monitor is dropped.
    pub async fn start_monitoring<F>(&self, on_alert: F) -> MonitorHandle
    where
        F: Fn(&OfflineAlert) + Send + Sync + 'static,
    {
        self.stop_monitoring();
        if let Ok(mut guard) = self.inner.on_alert.lock() {
            *guard = Some(Arc::new(on_alert));
        }

        self.run_scheduled_check().await;

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let handle = MonitorHandle {
            cancel: Arc::new(cancel_tx),
        };
        let period = self.inner.config.check_interval();
        let monitor: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = monitor.upgrade() else {
                            break;
                        };
                        Self { inner }.run_scheduled_check().await;
                    }
                }
            }
            tracing::debug!("Connectivity schedule ended");
        });

        if let Ok(mut guard) = self.inner.schedule.lock() {
            *guard = Some(handle.clone());
        }
        tracing::info!(
            "Connectivity monitoring started (every {:?})",
            Duration::from_secs(self.inner.config.check_interval_secs)
        );
        handle
    }

    /// Cancel the periodic schedule, if any.
    pub fn stop_monitoring(&self) {
        let handle = self
            .inner
            .schedule
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.cancel();
            tracing::info!("Connectivity monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .schedule
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|handle| !handle.is_cancelled()))
            .unwrap_or(false)
    }

    async fn run_scheduled_check(&self) {
        if let Err(error) = self.check_and_notify().await {
            tracing::error!("Periodic connectivity check failed: {error}");
        }
        if let Err(error) = self.inner.queue.run_maintenance().await {
            tracing::error!("Queue maintenance failed: {error}");
        }
    }
}
