use std::time::Duration;

/// Memory and elapsed-time figures attached to every execution result
///
/// `memory_bytes` describes the server process, not the submitted program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub memory_bytes: u64,
    pub elapsed: Duration,
}

impl ResourceSnapshot {
    pub fn capture(elapsed: Duration) -> Self {
        Self {
            memory_bytes: server_memory_bytes(),
            elapsed,
        }
    }

    /// Whole kibibytes, e.g. `"2048 KB"`
    pub fn memory_usage(&self) -> String {
        format!("{} KB", self.memory_bytes / 1024)
    }

    /// Whole milliseconds, e.g. `"15 ms"`
    pub fn cpu_usage(&self) -> String {
        format!("{} ms", self.elapsed.as_millis())
    }
}

/// Current resident set size of this process, or its peak when `/proc` is unavailable
pub fn server_memory_bytes() -> u64 {
    resident_set_bytes().unwrap_or_else(peak_resident_set_bytes)
}

fn resident_set_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }

    Some(pages * page_size as u64)
}

fn peak_resident_set_bytes() -> u64 {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) } != 0 {
        return 0;
    }
    let usage = unsafe { usage.assume_init() };

    let max_rss = usage.ru_maxrss.max(0) as u64;
    // ru_maxrss is in bytes on macOS and in KiB elsewhere
    if cfg!(target_os = "macos") {
        max_rss
    } else {
        max_rss * 1024
    }
}
