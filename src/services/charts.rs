// SPDX-License-Identifier: MIT

//! Pure aggregation helpers behind the admin chart endpoints.

use crate::time_utils::local_date_key;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One bar of a categorical chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

/// One point of a start/end date series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCounts {
    /// Calendar date `YYYY-MM-DD` in the runtime's local timezone.
    pub date: String,
    pub inicios: u64,
    pub terminados: u64,
}

/// Count items by an arbitrary string key.
///
/// Sorted by descending count, ties broken by key, so the chart's bar order
/// is stable across requests.
pub fn count_by_key<T, K>(items: &[T], key_fn: K) -> Vec<KeyCount>
where
    K: Fn(&T) -> &str,
{
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for item in items {
        let key = key_fn(item);
        if key.is_empty() {
            continue;
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut out: Vec<KeyCount> = counts
        .into_iter()
        .map(|(key, count)| KeyCount {
            key: key.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out
}

/// Merge two optional-timestamp projections into one date series.
///
/// Dates are truncated to local calendar days (same truncation the web
/// client used, including its off-by-one-day risk near midnight for users
/// in other timezones). A date present in only one projection gets a zero
/// counter for the other; output is sorted ascending by date.
pub fn count_by_date_key<T, S, E>(items: &[T], start_fn: S, end_fn: E) -> Vec<DateCounts>
where
    S: Fn(&T) -> Option<DateTime<Utc>>,
    E: Fn(&T) -> Option<DateTime<Utc>>,
{
    let mut merged: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for item in items {
        if let Some(start) = start_fn(item) {
            merged.entry(local_date_key(start)).or_insert((0, 0)).0 += 1;
        }
        if let Some(end) = end_fn(item) {
            merged.entry(local_date_key(end)).or_insert((0, 0)).1 += 1;
        }
    }

    merged
        .into_iter()
        .map(|(date, (inicios, terminados))| DateCounts {
            date,
            inicios,
            terminados,
        })
        .collect()
}
