// SPDX-License-Identifier: MIT

//! Shared helpers for date/time formatting.

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Truncate a timestamp to a `YYYY-MM-DD` calendar date key.
///
/// Uses the local timezone of the runtime, matching how the charts have
/// always bucketed dates. Near-midnight timestamps can land on a different
/// day than their UTC date.
pub fn local_date_key(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local)
        .date_naive()
        .format("%Y-%m-%d")
        .to_string()
}
