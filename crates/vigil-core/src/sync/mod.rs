//! Outbox: durable queue, retry policy, and the delivery seam

mod delivery;
mod queue;
mod retry;

pub use delivery::{DeliveryError, DeliveryResult, SyncDelivery};
pub use queue::SyncQueue;
pub use retry::RetryPolicy;
