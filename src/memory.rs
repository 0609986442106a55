//! System memory pressure checks.
//!
//! Pressure is observed, never enforced: callers log or surface a warning
//! and keep going. On platforms without /proc the check reports nothing
//! and the pipeline runs unthrottled.

/// Percentage of system memory in use, or `None` when it cannot be read.
pub fn used_percent() -> Option<f64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    let (total_kb, available_kb) = parse_meminfo(&text)?;
    if total_kb == 0 {
        return None;
    }
    Some((total_kb.saturating_sub(available_kb)) as f64 / total_kb as f64 * 100.0)
}

fn parse_meminfo(text: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = first_number(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = first_number(rest);
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }
    Some((total?, available?))
}

fn first_number(text: &str) -> Option<u64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Compares memory use against a configured ceiling.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMonitor {
    limit_percent: f64,
}

impl MemoryMonitor {
    pub fn new(limit_percent: f64) -> Self {
        Self { limit_percent }
    }

    /// Current usage when it exceeds the ceiling, otherwise `None`.
    pub fn over_limit(&self) -> Option<f64> {
        let used = used_percent()?;
        if used > self.limit_percent {
            Some(used)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16303428 kB\nMemFree:         1600812 kB\nMemAvailable:    8154364 kB\n";
        assert_eq!(parse_meminfo(text), Some((16_303_428, 8_154_364)));
    }

    #[test]
    fn test_parse_meminfo_missing_fields() {
        assert_eq!(parse_meminfo("MemTotal: 100 kB\n"), None);
        assert_eq!(parse_meminfo(""), None);
    }

    #[test]
    fn test_monitor_respects_limit() {
        // Can't pin real usage in a test; just exercise both bounds.
        let generous = MemoryMonitor::new(100.0);
        assert!(generous.over_limit().is_none());
        if used_percent().is_some() {
            let strict = MemoryMonitor::new(0.0);
            assert!(strict.over_limit().is_some());
        }
    }
}
