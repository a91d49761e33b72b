use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MB: u64 = 1024 * 1024;

/// A raw reading produced by a [`crate::MemorySource`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    /// System-wide memory usage in percent (0..=100).
    pub percent_used: f64,
    /// Absolute usage attributed to this process, in MiB.
    pub absolute_mb: f64,
}

/// One entry of the monitor history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Wall-clock time the reading was taken (milliseconds since the Unix epoch).
    pub timestamp_ms: u64,
    pub percent_used: f64,
    pub absolute_mb: f64,
}

impl MemorySample {
    pub fn new(timestamp_ms: u64, percent_used: f64, absolute_mb: f64) -> Self {
        Self {
            timestamp_ms,
            percent_used,
            absolute_mb,
        }
    }

    pub fn from_reading(timestamp_ms: u64, reading: MemoryReading) -> Self {
        Self::new(timestamp_ms, reading.percent_used, reading.absolute_mb)
    }
}

/// Milliseconds since the Unix epoch, saturating to zero for clocks set before 1970.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
