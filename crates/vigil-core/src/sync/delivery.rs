//! Remote delivery seam.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SyncQueueItem;

/// Why a single delivery attempt failed. Every kind is retried per policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network or backend outage
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Backend answered but refused the item
    #[error("delivery rejected: {0}")]
    Rejected(String),
    /// The collaborator panicked while delivering the item
    #[error("delivery panicked: {0}")]
    Panicked(String),
}

pub type DeliveryResult = Result<(), DeliveryError>;

/// Pushes one queued mutation to the remote service.
///
/// Implementations own transport, authentication and timeouts. The queue
/// never calls `deliver` concurrently with itself.
#[async_trait]
pub trait SyncDelivery: Send + Sync {
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryResult;
}
