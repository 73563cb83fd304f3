use std::collections::HashSet;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{NormalizedPoint, Reading};
use crate::normalize::wall_clock;

/// Calendar unit a history chart is bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// `HH:mm`, one point per minute of the day.
    HourMinute,
    /// `YYYY-MM-DD`, one point per calendar day.
    CalendarDay,
}

impl Granularity {
    fn format(&self) -> &'static str {
        match self {
            Granularity::HourMinute => "%H:%M",
            Granularity::CalendarDay => "%Y-%m-%d",
        }
    }
}

/// Bucket key of a raw timestamp, truncated on the clock as written.
///
/// Both key formats are zero-padded, so lexicographic order is time order.
/// A bare `HH:mm` is accepted for minute buckets so already-bucketed data
/// maps onto itself.
pub fn bucket_key(raw: &str, granularity: Granularity) -> Option<String> {
    if let Some(naive) = wall_clock(raw) {
        return Some(naive.format(granularity.format()).to_string());
    }
    match granularity {
        Granularity::HourMinute => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .ok()
            .map(|t| t.format("%H:%M").to_string()),
        Granularity::CalendarDay => None,
    }
}

/// One point per bucket key, sorted ascending by key.
///
/// The first reading seen for a key wins; later duplicates are dropped even
/// if they are newer. Readings whose timestamp cannot be parsed never form
/// a bucket.
pub fn bucket(readings: &[Reading], granularity: Granularity) -> Vec<NormalizedPoint> {
    let mut seen: HashSet<String> = HashSet::with_capacity(readings.len());
    let mut points = Vec::new();
    let mut skipped = 0usize;

    for reading in readings {
        let Some(key) = bucket_key(&reading.timestamp, granularity) else {
            skipped += 1;
            continue;
        };
        if seen.insert(key.clone()) {
            points.push(NormalizedPoint::from_reading(reading, key));
        }
    }

    if skipped > 0 {
        warn!("Bucketing skipped {} of {} readings with unparseable timestamps", skipped, readings.len());
    }

    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    points
}
