//! Durable, priority-ordered outbox service.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;

use crate::clock::{system_clock, SharedClock};
use crate::db::{Database, QueueRepository, SqliteQueueRepository};
use crate::error::{Error, Result};
use crate::models::{
    FlushError, FlushResult, MaintenanceReport, QueueStats, SyncDataType, SyncQueueItem,
};
use crate::util::{compact_text, panic_message};

use super::delivery::{DeliveryError, DeliveryResult, SyncDelivery};
use super::retry::RetryPolicy;

/// Thread-safe handle to the outbox.
///
/// Cloning is cheap and every clone drives the same store, delivery
/// collaborator and flush guard.
#[derive(Clone)]
pub struct SyncQueue {
    db: Arc<Mutex<Database>>,
    delivery: Arc<dyn SyncDelivery>,
    policy: RetryPolicy,
    clock: SharedClock,
    flush_guard: Arc<Mutex<()>>,
    flush_cycles: Arc<AtomicU64>,
}

impl SyncQueue {
    /// Open an outbox persisted at the given filesystem path.
    pub fn open(
        db_path: impl AsRef<Path>,
        delivery: Arc<dyn SyncDelivery>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        let db = Database::open(db_path)?;
        Ok(Self::from_database(db, delivery, policy))
    }

    /// Open an in-memory outbox (primarily for tests).
    pub fn open_in_memory(delivery: Arc<dyn SyncDelivery>, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db, delivery, policy))
    }

    fn from_database(db: Database, delivery: Arc<dyn SyncDelivery>, policy: RetryPolicy) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            delivery,
            policy,
            clock: system_clock(),
            flush_guard: Arc::new(Mutex::new(())),
            flush_cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    pub(crate) fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Number of flush cycles that ran to completion.
    pub fn flush_cycles(&self) -> u64 {
        self.flush_cycles.load(Ordering::SeqCst)
    }

    /// Durably queue a mutation for later delivery.
    ///
    /// This is a local write only; it never waits on the network. An unknown
    /// data type is accepted and drains last. Re-using an id replaces the
    /// queued item and resets its retry state; if the old contents are being
    /// delivered at that moment, the replacement stays queued for the next
    /// cycle.
    pub async fn enqueue(
        &self,
        id: &str,
        data_type: SyncDataType,
        data_id: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "queue item id cannot be empty".to_string(),
            ));
        }
        if !data_type.is_known() {
            tracing::warn!(
                "Unknown sync data type '{}' for item {}; queuing at lowest priority",
                data_type,
                id
            );
        }

        let item = SyncQueueItem::new(id, data_type, data_id, payload, self.clock.now_ms());

        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.upsert(&item)?;

        tracing::debug!(
            "Queued {} item {} (priority {})",
            item.data_type,
            item.id,
            item.priority
        );
        Ok(())
    }

    /// Snapshot of every queued item in drain order.
    pub async fn get_queued_items(&self) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.list()
    }

    /// Fetch a single queued item.
    pub async fn get_item(&self, id: &str) -> Result<Option<SyncQueueItem>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.get(id)
    }

    /// Number of queued items.
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.count()
    }

    /// Counts computed from the store on every call.
    pub async fn get_stats(&self) -> Result<QueueStats> {
        let now = self.clock.now_ms();
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.stats(now)
    }

    /// Drop every queued item.
    pub async fn clear_queue(&self) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        let removed = repo.clear()?;
        tracing::info!("Cleared sync queue ({removed} item(s) removed)");
        Ok(())
    }

    /// Attempt every eligible item once, in drain order.
    ///
    /// Items are delivered one at a time. A second call while a flush is in
    /// flight waits for it to finish and then re-reads the store, so an item
    /// is never handed to the delivery collaborator twice in parallel.
    pub async fn flush(&self) -> Result<FlushResult> {
        let _flushing = self.flush_guard.lock().await;

        let eligible = {
            let now = self.clock.now_ms();
            let db = self.db.lock().await;
            let repo = SqliteQueueRepository::new(db.connection());
            repo.list_eligible(now)?
        };

        let mut result = FlushResult::empty();
        for item in eligible {
            if self.policy.is_exhausted(item.retry_count) {
                self.discard_spent_item(&item).await;
                continue;
            }
            match self.attempt(&item).await {
                Ok(()) => self.complete_item(&item, &mut result).await,
                Err(error) => self.fail_item(&item, &error, &mut result).await,
            }
        }
        result.success = result.failed_count == 0;

        self.flush_cycles.fetch_add(1, Ordering::SeqCst);
        if result.synced_count > 0 || result.failed_count > 0 {
            tracing::info!(
                "Flush finished: {} synced, {} failed",
                result.synced_count,
                result.failed_count
            );
        }
        Ok(result)
    }

    /// Deliver one item; a panic in the collaborator counts as a failed attempt.
    async fn attempt(&self, item: &SyncQueueItem) -> DeliveryResult {
        match AssertUnwindSafe(self.delivery.deliver(item))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!("Delivery of item {} panicked: {reason}", item.id);
                Err(DeliveryError::Panicked(reason))
            }
        }
    }

    async fn complete_item(&self, item: &SyncQueueItem, result: &mut FlushResult) {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        match repo.delete(item) {
            Ok(removed) => {
                result.synced_count += 1;
                if removed {
                    tracing::debug!("Delivered {} item {}", item.data_type, item.id);
                } else {
                    tracing::debug!(
                        "Delivered {} item {}; its re-queued contents stay pending",
                        item.data_type,
                        item.id
                    );
                }
            }
            Err(error) => {
                // Still queued, so it is redelivered on a later cycle
                tracing::warn!("Delivered item {} but could not dequeue it: {error}", item.id);
                result.failed_count += 1;
                result.errors.push(FlushError {
                    id: item.id.clone(),
                    message: format!("Delivered but not dequeued: {error}"),
                });
            }
        }
    }

    async fn fail_item(
        &self,
        item: &SyncQueueItem,
        error: &DeliveryError,
        result: &mut FlushResult,
    ) {
        result.failed_count += 1;
        let retry_count = item.retry_count.saturating_add(1);
        let now = self.clock.now_ms();
        let next_retry_at = self.policy.next_retry_at(now, retry_count);
        let reason = compact_text(&error.to_string());

        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());

        // Persisted first so a failed delete still leaves the row marked spent
        let recorded = repo.record_failure(item, retry_count, now, next_retry_at, &reason);
        if matches!(recorded, Ok(false)) {
            tracing::debug!(
                "Item {} was re-queued during a failed delivery; keeping the new contents",
                item.id
            );
            return;
        }

        if self.policy.is_exhausted(retry_count) {
            tracing::warn!(
                "Dropping {} item {} after {} failed attempts: {error}",
                item.data_type,
                item.id,
                retry_count
            );
            if let Err(store_error) = repo.delete(item) {
                tracing::warn!("Could not drop exhausted item {}: {store_error}", item.id);
            }
            result.errors.push(FlushError {
                id: item.id.clone(),
                message: format!(
                    "Max retries ({}) reached: {reason}",
                    self.policy.max_attempts
                ),
            });
            return;
        }

        match recorded {
            Ok(_) => tracing::warn!(
                "Delivery of {} item {} failed (attempt {retry_count}/{}), retry in {}ms: {error}",
                item.data_type,
                item.id,
                self.policy.max_attempts,
                next_retry_at - now
            ),
            Err(store_error) => result.errors.push(FlushError {
                id: item.id.clone(),
                message: format!("Could not schedule retry: {store_error}"),
            }),
        }
    }

    /// Remove an item whose retry budget was spent before this cycle.
    async fn discard_spent_item(&self, item: &SyncQueueItem) {
        tracing::warn!(
            "Discarding {} item {} without delivery: {} attempts already made",
            item.data_type,
            item.id,
            item.retry_count
        );
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        if let Err(error) = repo.delete(item) {
            tracing::warn!("Could not drop exhausted item {}: {error}", item.id);
        }
    }

    /// Compensating cleanup run by the monitor's scheduler.
    ///
    /// Removes rows whose retry budget is already spent and pulls retry times
    /// that lie beyond the maximum delay back into range. Skipped while a
    /// flush is running.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let Ok(_flushing) = self.flush_guard.try_lock() else {
            tracing::debug!("Skipping queue maintenance while a flush is in flight");
            return Ok(MaintenanceReport::default());
        };

        let now = self.clock.now_ms();
        let latest = self.policy.next_retry_at(now, u32::MAX);
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        let report = MaintenanceReport {
            exhausted_removed: repo.delete_exhausted(self.policy.max_attempts)?,
            retries_rescheduled: repo.clamp_next_retry(now, latest)?,
        };

        if report != MaintenanceReport::default() {
            tracing::info!(
                "Queue maintenance removed {} exhausted item(s), rescheduled {}",
                report.exhausted_removed,
                report.retries_rescheduled
            );
        }
        Ok(report)
    }
}
