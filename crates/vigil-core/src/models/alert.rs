//! Offline alert model

use serde::{Deserialize, Serialize};

/// Severity of a prolonged outage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

/// Alert handed to the notification sink. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAlert {
    pub level: AlertLevel,
    /// Human-readable summary including duration and backlog
    pub message: String,
    pub offline_duration_hours: f64,
    /// Items still waiting in the outbox
    pub pending_sync_count: usize,
}

impl OfflineAlert {
    pub(crate) fn new(
        level: AlertLevel,
        offline_duration_hours: f64,
        pending_sync_count: usize,
    ) -> Self {
        let message = match level {
            AlertLevel::Critical => format!(
                "Offline for {:.1} days with {pending_sync_count} item(s) waiting to sync. \
                 Connect to the internet so your care team receives your latest data.",
                offline_duration_hours / 24.0
            ),
            AlertLevel::Warning => format!(
                "Offline for {offline_duration_hours:.0} hours with {pending_sync_count} item(s) waiting to sync."
            ),
            AlertLevel::None => String::new(),
        };
        Self {
            level,
            message,
            offline_duration_hours,
            pending_sync_count,
        }
    }
}
