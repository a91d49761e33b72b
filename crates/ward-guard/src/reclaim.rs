/// Best-effort request to give freed memory back to the operating system.
///
/// Invoked by the registry after every cleanup attempt. Implementations must be
/// cheap and must never fail loudly.
pub trait ReclaimHint: Send + Sync {
    fn reclaim(&self);
}

impl<F> ReclaimHint for F
where
    F: Fn() + Send + Sync,
{
    fn reclaim(&self) {
        self()
    }
}

/// Default hint: `malloc_trim(0)` on glibc targets, a no-op elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct MallocTrim;

impl ReclaimHint for MallocTrim {
    fn reclaim(&self) {
        let released = reclaim_memory();
        tracing::trace!(target = "ward.guard", released, "memory reclaim hint");
    }
}

/// Ask the allocator to return free heap pages. Returns whether anything was released.
pub fn reclaim_memory() -> bool {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        // SAFETY: `malloc_trim` only inspects allocator-internal state and is
        // safe to call from any thread at any time.
        unsafe { libc::malloc_trim(0) != 0 }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_hints() {
        let calls = AtomicUsize::new(0);
        let hint = || {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        hint.reclaim();
        hint.reclaim();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn malloc_trim_never_panics() {
        MallocTrim.reclaim();
    }
}
