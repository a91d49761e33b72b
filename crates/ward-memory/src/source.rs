use crate::process;
use crate::types::{MemoryReading, MB};
use parking_lot::Mutex;
use sysinfo::System;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("memory source reported zero total memory")]
    NoTotalMemory,
    #[error("memory source unavailable: {0}")]
    Unavailable(String),
}

/// Something that can report current memory usage.
///
/// The monitor never inspects where readings come from; tests script their own
/// sources while production uses [`SystemMemorySource`].
pub trait MemorySource: Send + Sync {
    fn read(&self) -> Result<MemoryReading, SampleError>;
}

impl<F> MemorySource for F
where
    F: Fn() -> Result<MemoryReading, SampleError> + Send + Sync,
{
    fn read(&self) -> Result<MemoryReading, SampleError> {
        self()
    }
}

/// Reads system-wide usage through `sysinfo` and the process RSS from `/proc`.
pub struct SystemMemorySource {
    system: Mutex<System>,
}

impl SystemMemorySource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemMemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemorySource").finish_non_exhaustive()
    }
}

impl MemorySource for SystemMemorySource {
    fn read(&self) -> Result<MemoryReading, SampleError> {
        let (total, used) = {
            let mut system = self.system.lock();
            system.refresh_memory();
            (system.total_memory(), system.used_memory())
        };
        if total == 0 {
            return Err(SampleError::NoTotalMemory);
        }

        let percent_used = (used as f64 / total as f64) * 100.0;
        // Without RSS support we fall back to system-wide usage so `absolute_mb` stays meaningful.
        let absolute_bytes = process::current_rss_bytes().unwrap_or(used);
        Ok(MemoryReading {
            percent_used: percent_used.clamp(0.0, 100.0),
            absolute_mb: absolute_bytes as f64 / MB as f64,
        })
    }
}
