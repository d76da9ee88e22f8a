//! Connectivity state model

use serde::{Deserialize, Serialize};

/// Ground-truth online/offline state.
///
/// `offline_since` is set exactly when `is_online` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    /// Last time the device was seen online (Unix ms)
    pub last_online_at: Option<i64>,
    /// Start of the current outage (Unix ms)
    pub offline_since: Option<i64>,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            is_online: true,
            last_online_at: None,
            offline_since: None,
        }
    }
}

impl ConnectivityState {
    /// Milliseconds spent offline as of `now_ms`; 0 while online.
    pub fn offline_duration_ms(&self, now_ms: i64) -> i64 {
        match (self.is_online, self.offline_since) {
            (false, Some(since)) => now_ms.saturating_sub(since).max(0),
            _ => 0,
        }
    }
}

/// Point-in-time status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub is_online: bool,
    pub last_online_at: Option<i64>,
    pub last_checked_at: i64,
    pub offline_duration_ms: i64,
}
