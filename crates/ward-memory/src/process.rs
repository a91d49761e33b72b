/// Resident set size of the current process, when the platform exposes it.
pub fn current_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => status,
            Err(err) => {
                // `/proc` may be hidden in sandboxes; only unexpected failures are worth a log line.
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(
                        target = "ward.memory",
                        error = %err,
                        "failed to read /proc/self/status while sampling rss"
                    );
                }
                return None;
            }
        };
        parse_vm_rss_bytes(&status)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Extract `VmRSS` (reported in kB) from `/proc/<pid>/status` contents.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_vm_rss_bytes(status: &str) -> Option<u64> {
    let rest = status
        .lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kb = rest.split_whitespace().next()?;
    match kb.parse::<u64>() {
        Ok(kb) => Some(kb.saturating_mul(1024)),
        Err(err) => {
            static REPORTED: std::sync::OnceLock<()> = std::sync::OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target = "ward.memory",
                    value = kb,
                    error = %err,
                    "failed to parse VmRSS from /proc/self/status"
                );
            }
            None
        }
    }
}
