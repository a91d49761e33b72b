//! Memory sampling and pressure detection for Ward.
//!
//! The [`PressureMonitor`] owns a bounded history of [`MemorySample`]s taken
//! from a [`MemorySource`], classifies the latest sample into a
//! [`PressureLevel`] and detects rising trends so callers can react before
//! the hard ceiling is reached.
//!
//! Sampling is rate-limited: repeated calls to [`PressureMonitor::sample`]
//! within the configured check interval return the cached sample.

mod monitor;
mod pressure;
mod process;
mod source;
mod stats;
mod types;

pub use monitor::{MonitorConfig, PressureMonitor};
pub use pressure::{PressureLevel, PressureThresholds, Trend};
pub use process::current_rss_bytes;
pub use source::{MemorySource, SampleError, SystemMemorySource};
pub use stats::PressureStats;
pub use types::{now_ms, MemoryReading, MemorySample, MB};
