//! Quiet-hours evaluation

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::data::types::QuietHours;
use crate::utils::time::{in_window, parse_hhmm};

/// Whether the timestamp falls inside the quiet-hours window.
///
/// The window is `[start, end)` in the preference's timezone; `end <= start`
/// wraps across midnight. An unknown timezone falls back to UTC and an
/// unparsable start or end disables the window.
pub fn is_active(quiet_hours: &QuietHours, at: DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) = (parse_hhmm(&quiet_hours.start), parse_hhmm(&quiet_hours.end))
    else {
        return false;
    };

    let tz: Tz = match quiet_hours.timezone.as_deref() {
        None | Some("") => Tz::UTC,
        Some(name) => name.parse().unwrap_or_else(|_| {
            tracing::debug!(timezone = name, "Unknown quiet-hours timezone, using UTC");
            Tz::UTC
        }),
    };

    in_window(at.with_timezone(&tz).time(), start, end)
}
