//! Key store configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::KeyStoreError;

/// Default lifetime of an issued pair, in minutes (24 hours)
pub const DEFAULT_DURATION_MINUTES: u64 = 24 * 60;

/// Default expiry sweep interval, in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Key store configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// How often expired pairs are swept
    pub sweep_interval_secs: u64,

    /// Lifetime used when an issuance request gives none
    pub default_duration_minutes: u64,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }
}

impl KeyStoreConfig {
    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Set the default pair lifetime
    pub fn default_duration(mut self, duration: Duration) -> Self {
        self.default_duration_minutes = duration.as_secs() / 60;
        self
    }

    pub fn sweep_interval_duration(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn default_duration_value(&self) -> Duration {
        Duration::from_secs(self.default_duration_minutes.saturating_mul(60))
    }

    /// Resolve a requested lifetime in minutes; missing or non-positive means default
    pub fn resolve_duration(&self, minutes: Option<i64>) -> Result<Duration, KeyStoreError> {
        match minutes {
            Some(m) if m > 0 => u64::try_from(m)
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or(KeyStoreError::DurationOutOfRange(m)),
            _ => Ok(self.default_duration_value()),
        }
    }
}
