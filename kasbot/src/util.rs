//! Small helpers shared across the crate.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix milliseconds.
#[must_use]
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Generate a unique identifier with the given prefix.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a unique event identifier.
#[must_use]
pub fn generate_event_id() -> String {
    generate_id("evt")
}

/// Home directory, falling back to the current directory.
#[must_use]
pub fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Base configuration directory (`~/.kasbot`).
#[must_use]
pub fn config_dir() -> PathBuf {
    home_dir().join(".kasbot")
}

/// Round a duration up to whole seconds, for user-facing wait messages.
#[must_use]
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Truncate a string to at most `max` characters, appending an ellipsis.
#[must_use]
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_prefix_and_uniqueness() {
        let a = generate_id("wait");
        let b = generate_id("wait");
        assert!(a.starts_with("wait_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::from_millis(2001)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("kaspa:qpzry9x8", 6), "kaspa…");
    }
}
