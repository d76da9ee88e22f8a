//! vigil-core - Core library for Vigil
//!
//! This crate contains the offline-resilient sync engine embedded in the
//! mobile client: a durable, priority-ordered outbox with bounded
//! exponential-backoff retry, and a connectivity monitor that flushes it on
//! reconnection and escalates prolonged outages.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
mod util;

#[cfg(test)]
mod test_support;

pub use config::{EngineConfig, MonitorConfig};
pub use connectivity::{AlertCallback, ConnectivityMonitor, MonitorHandle};
pub use error::{Error, Result};
pub use models::{AlertLevel, OfflineAlert, SyncDataType, SyncQueueItem};
pub use sync::{DeliveryError, RetryPolicy, SyncDelivery, SyncQueue};
