use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{NoiseError, Result};

/// Zone a timestamp without an explicit offset is assumed to be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneHint {
    /// Naive timestamps are UTC (sensor.community, backend storage).
    Utc,
    /// Naive timestamps are already wall-clock time of the target zone.
    Unspecified,
}

/// A timestamp as written by a source: either an absolute instant or a
/// wall-clock time whose zone must come from context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    Absolute(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedTimestamp {
    /// The clock reading exactly as written, offset dropped.
    pub fn wall_clock(&self) -> NaiveDateTime {
        match self {
            ParsedTimestamp::Absolute(dt) => dt.naive_local(),
            ParsedTimestamp::Naive(naive) => *naive,
        }
    }

    /// Pin the timestamp to an instant. An explicit offset always wins over the hint.
    pub fn to_utc(&self, hint: ZoneHint, target: Tz) -> Option<DateTime<Utc>> {
        match (self, hint) {
            (ParsedTimestamp::Absolute(dt), _) => Some(dt.with_timezone(&Utc)),
            (ParsedTimestamp::Naive(naive), ZoneHint::Utc) => Some(Utc.from_utc_datetime(naive)),
            (ParsedTimestamp::Naive(naive), ZoneHint::Unspecified) => {
                from_local(&target, naive).map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

// `%#z` takes `Z`, `+01`, `+0100` and `+01:00`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

const NAIVE_ISO_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

const FALLBACK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a source timestamp: ISO-8601 first (extended or basic format, with
/// or without offset, down to a bare date), then the `YYYY-MM-DD HH:mm:ss`
/// pattern.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTimestamp::Absolute(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(ParsedTimestamp::Absolute(dt));
        }
    }
    for fmt in NAIVE_ISO_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ParsedTimestamp::Naive(naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(ParsedTimestamp::Naive);
        }
    }

    NaiveDateTime::parse_from_str(raw, FALLBACK_FORMAT)
        .ok()
        .map(ParsedTimestamp::Naive)
}

/// Wall-clock reading of a timestamp as written, or `None` if it cannot be parsed.
pub fn wall_clock(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp(raw).map(|parsed| parsed.wall_clock())
}

/// Re-express `raw` in `target`.
pub fn localize(raw: &str, hint: ZoneHint, target: Tz) -> Result<DateTime<Tz>> {
    parse_timestamp(raw)
        .and_then(|parsed| parsed.to_utc(hint, target))
        .map(|utc| utc.with_timezone(&target))
        .ok_or_else(|| NoiseError::UnparseableTimestamp(raw.to_string()))
}

/// Re-express `raw` in `target` as ISO-8601 with offset, e.g.
/// `2024-01-15T11:30:00+01:00`.
pub fn normalize(raw: &str, hint: ZoneHint, target: Tz) -> Result<String> {
    localize(raw, hint, target).map(|dt| to_iso(&dt))
}

pub fn to_iso(dt: &DateTime<Tz>) -> String {
    dt.fixed_offset().to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn from_local(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // Inside a spring-forward gap: move past it like the zone's clocks do.
        LocalResult::None => tz.from_local_datetime(&(*naive + Duration::hours(1))).earliest(),
    }
}
