//! Outbox item model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of domain mutation carried by a queue item.
///
/// Unrecognised names are kept verbatim in [`SyncDataType::Other`] so a
/// classification gap never prevents an item from being queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncDataType {
    AlertAcknowledgment,
    Assessment,
    Baseline,
    PatientUpdate,
    Gradient,
    Other(String),
}

impl SyncDataType {
    /// Drain priority lane; higher drains first.
    pub const fn priority(&self) -> i64 {
        match self {
            Self::AlertAcknowledgment => 100,
            Self::Assessment => 50,
            Self::Gradient => 10,
            Self::Baseline | Self::PatientUpdate | Self::Other(_) => 0,
        }
    }

    /// Whether this type was recognised when parsed.
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Canonical stored name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AlertAcknowledgment => "ALERT_ACKNOWLEDGMENT",
            Self::Assessment => "ASSESSMENT",
            Self::Baseline => "BASELINE",
            Self::PatientUpdate => "PATIENT_UPDATE",
            Self::Gradient => "GRADIENT",
            Self::Other(raw) => raw,
        }
    }

    /// Parse a stored or caller-supplied name. Never fails.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALERT_ACKNOWLEDGMENT" => Self::AlertAcknowledgment,
            "ASSESSMENT" => Self::Assessment,
            "BASELINE" => Self::Baseline,
            "PATIENT_UPDATE" => Self::PatientUpdate,
            "GRADIENT" => Self::Gradient,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl fmt::Display for SyncDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SyncDataType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for SyncDataType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SyncDataType> for String {
    fn from(value: SyncDataType) -> Self {
        value.as_str().to_string()
    }
}

/// One pending outbound mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Caller-chosen idempotency key
    pub id: String,
    /// Kind of mutation
    pub data_type: SyncDataType,
    /// Id of the referenced domain entity
    pub data_id: String,
    /// Opaque serialized payload
    pub payload: Vec<u8>,
    /// Drain priority, fixed at creation
    pub priority: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Failed delivery attempts so far
    pub retry_count: u32,
    /// Last failed attempt (Unix ms)
    pub last_retry_at: Option<i64>,
    /// Earliest next attempt (Unix ms); `None` means eligible now
    pub next_retry_at: Option<i64>,
    /// Reason for the last failure
    pub error_message: Option<String>,
    /// Bumped by the store each time the id is enqueued again
    #[serde(default)]
    pub revision: u32,
}

impl SyncQueueItem {
    /// Create a fresh, immediately eligible item.
    pub fn new(
        id: impl Into<String>,
        data_type: SyncDataType,
        data_id: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        created_at: i64,
    ) -> Self {
        let priority = data_type.priority();
        Self {
            id: id.into(),
            data_type,
            data_id: data_id.into(),
            payload: payload.into(),
            priority,
            created_at,
            retry_count: 0,
            last_retry_at: None,
            next_retry_at: None,
            error_message: None,
            revision: 0,
        }
    }
}

/// Snapshot of queue contents for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_items: usize,
    /// Item count keyed by stored data type name
    pub items_by_type: BTreeMap<String, usize>,
    pub items_ready_for_sync: usize,
    pub items_waiting_for_retry: usize,
}

/// A failure recorded during one flush cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushError {
    pub id: String,
    pub message: String,
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushResult {
    /// `true` when nothing failed in this cycle
    pub success: bool,
    pub synced_count: usize,
    pub failed_count: usize,
    pub errors: Vec<FlushError>,
}

impl FlushResult {
    pub(crate) fn empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// Outcome of one compensating maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Rows removed because their retry budget was already spent
    pub exhausted_removed: usize,
    /// Rows whose `next_retry_at` was pulled back within the maximum delay
    pub retries_rescheduled: usize,
}
