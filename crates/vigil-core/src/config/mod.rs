//! Engine configuration.
//!
//! Provides a unified `EngineConfig` struct that embedders load from a JSON
//! document (or build in code) to tune retry behaviour and offline alerting.
//! Missing fields fall back to the defaults; unknown fields are rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::RetryPolicy;

/// Periodic connectivity check cadence (30 minutes).
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30 * 60;
/// Offline hours after which a WARNING alert is raised.
const DEFAULT_PROLONGED_OFFLINE_HOURS: u32 = 24;
/// Offline days after which a CRITICAL alert is raised.
const DEFAULT_CRITICAL_OFFLINE_DAYS: u32 = 3;

/// Connectivity monitor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between periodic checks
    pub check_interval_secs: u64,
    /// Offline duration (hours) that raises a WARNING
    pub prolonged_offline_hours: u32,
    /// Offline duration (days) that raises a CRITICAL alert
    pub critical_offline_days: u32,
    /// Keep `offline_since` across restarts so escalation is not reset
    pub persist_connectivity_state: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            prolonged_offline_hours: DEFAULT_PROLONGED_OFFLINE_HOURS,
            critical_offline_days: DEFAULT_CRITICAL_OFFLINE_DAYS,
            persist_connectivity_state: true,
        }
    }
}

impl MonitorConfig {
    /// Interval between periodic checks.
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(Error::Configuration(
                "check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.prolonged_offline_hours == 0 {
            return Err(Error::Configuration(
                "prolonged_offline_hours must be greater than 0".to_string(),
            ));
        }
        if self.critical_offline_days == 0 {
            return Err(Error::Configuration(
                "critical_offline_days must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Parse and validate a configuration document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.monitor.validate()
    }
}
