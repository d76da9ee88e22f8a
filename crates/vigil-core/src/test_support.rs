//! Shared fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::models::SyncQueueItem;
use crate::sync::{DeliveryError, DeliveryResult, SyncDelivery};

/// Install a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vigil_core=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Delivery fake that records attempts and fails on demand.
#[derive(Default)]
pub struct ScriptedDelivery {
    fail_everything: bool,
    latency: Option<Duration>,
    gated: bool,
    panic_on: Option<String>,
    scheduled_failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<Vec<String>>,
    payloads: Mutex<Vec<Vec<u8>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delivering: Notify,
    gate: Notify,
}

impl ScriptedDelivery {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_everything: true,
            ..Self::default()
        })
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    /// Every delivery parks until [`Self::open_gate`] is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gated: true,
            ..Self::default()
        })
    }

    /// Panics whenever `id` is delivered; other items succeed.
    pub fn panicking_on(id: &str) -> Arc<Self> {
        Arc::new(Self {
            panic_on: Some(id.to_string()),
            ..Self::default()
        })
    }

    /// Fail the next `times` attempts for `id`.
    pub fn fail_next(&self, id: &str, times: u32) {
        self.scheduled_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), times);
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// Payloads in the order they were handed over.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_until_delivering(&self) {
        self.delivering.notified().await;
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SyncDelivery for ScriptedDelivery {
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryResult {
        self.attempts.lock().unwrap().push(item.id.clone());
        self.payloads.lock().unwrap().push(item.payload.clone());
        if self.panic_on.as_deref() == Some(item.id.as_str()) {
            panic!("delivery collaborator exploded");
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.delivering.notify_one();

        if self.gated {
            self.gate.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scheduled_failure = {
            let mut failures = self.scheduled_failures.lock().unwrap();
            match failures.get_mut(&item.id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_everything || scheduled_failure {
            Err(DeliveryError::Transient("offline".to_string()))
        } else {
            Ok(())
        }
    }
}
