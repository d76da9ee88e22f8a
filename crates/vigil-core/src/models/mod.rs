//! Data models for Vigil

mod alert;
mod connectivity;
mod queue_item;

pub use alert::{AlertLevel, OfflineAlert};
pub use connectivity::{ConnectivityState, ConnectivityStatus};
pub use queue_item::{
    FlushError, FlushResult, MaintenanceReport, QueueStats, SyncDataType, SyncQueueItem,
};
