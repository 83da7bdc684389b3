//! Bucket configuration
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{LeakyError, Result};

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_DRAIN_BY: &str = "5";
pub const DEFAULT_DRAIN_INTERVAL_MS: &str = "60000";
pub const DEFAULT_CAPACITY: &str = "300";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BucketSettings {
    // Amount removed per elapsed interval
    pub drain_by: i64,

    // Length of one drain interval in nanoseconds, same resolution as the wire format
    pub drain_interval_ns: i64,

    // Maximum value the bucket accepts
    pub capacity: i64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            drain_by: 5,
            drain_interval_ns: 60_000_000_000,
            capacity: 300,
        }
    }
}

impl BucketSettings {
    /// Intervals longer than `i64::MAX` nanoseconds (~292 years) saturate
    pub fn new(drain_by: i64, drain_interval: Duration, capacity: i64) -> Self {
        let drain_interval_ns = drain_interval.num_nanoseconds().unwrap_or(
            if drain_interval < Duration::zero() {
                i64::MIN
            } else {
                i64::MAX
            },
        );
        Self {
            drain_by,
            drain_interval_ns,
            capacity,
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::nanoseconds(self.drain_interval_ns)
    }

    /// Apply the same rules `Bucket::new` does
    pub fn validate(&self) -> Result<()> {
        if self.drain_by <= 0 || self.drain_interval_ns <= 0 {
            return Err(LeakyError::NeverDrains);
        }
        if self.capacity <= 0 {
            return Err(LeakyError::NeverFills);
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
