use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{RangeMode, Reading};
use crate::normalize::wall_clock;

/// Per-day summary of raw readings: mean LAeq, loudest LAmax, quietest LAmin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub laeq: f64,
    pub lamax: f64,
    pub lamin: f64,
    pub samples: usize,
}

impl DailyAggregate {
    /// As a reading stamped at the start of its day.
    pub fn to_reading(&self) -> Reading {
        Reading::new(
            self.date.format("%Y-%m-%dT00:00").to_string(),
            self.laeq,
            self.lamax,
            self.lamin,
        )
    }
}

struct DayAccumulator {
    sum: f64,
    max: f64,
    min: f64,
    count: usize,
}

/// Collapse readings into one aggregate per calendar date, sorted by date.
/// Readings with unparseable timestamps are ignored.
pub fn aggregate_daily(readings: &[Reading]) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

    for reading in readings {
        let Some(naive) = wall_clock(&reading.timestamp) else {
            continue;
        };
        let acc = days.entry(naive.date()).or_insert(DayAccumulator {
            sum: 0.0,
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            count: 0,
        });
        acc.sum += reading.noise_equivalent;
        acc.max = acc.max.max(reading.noise_max);
        acc.min = acc.min.min(reading.noise_min);
        acc.count += 1;
    }

    days.into_iter()
        .map(|(date, acc)| DailyAggregate {
            date,
            laeq: acc.sum / acc.count as f64,
            lamax: acc.max,
            lamin: acc.min,
            samples: acc.count,
        })
        .collect()
}

/// Inclusive date window of a range relative to `today`; `None` means unbounded.
///
/// Weeks run Monday to Sunday.
pub fn range_bounds(mode: RangeMode, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    match mode {
        RangeMode::AllTime => None,
        RangeMode::Day => Some((today, today)),
        RangeMode::Week => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            Some((monday, monday + Duration::days(6)))
        }
        RangeMode::Month => {
            let first = today.with_day(1)?;
            let next_month = if today.month() == 12 {
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)?
            };
            Some((first, next_month - Duration::days(1)))
        }
    }
}

/// Keep readings whose date falls inside the range window, preserving order.
pub fn filter_range(readings: &[Reading], mode: RangeMode, today: NaiveDate) -> Vec<Reading> {
    let bounds = range_bounds(mode, today);
    readings
        .iter()
        .filter(|reading| {
            let Some(naive) = wall_clock(&reading.timestamp) else {
                return false;
            };
            match bounds {
                None => true,
                Some((start, end)) => naive.date() >= start && naive.date() <= end,
            }
        })
        .cloned()
        .collect()
}
