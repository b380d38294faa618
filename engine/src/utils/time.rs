//! Time helpers for quiet-hours evaluation

use chrono::NaiveTime;

/// Parse an `HH:MM` wall-clock string.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Whether `at` falls within the half-open window `[start, end)`.
///
/// `end <= start` means the window wraps across midnight.
pub fn in_window(at: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if end <= start {
        at >= start || at < end
    } else {
        at >= start && at < end
    }
}
