use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NoiseError;
use crate::history::Granularity;

/// A raw reading as received from a data source. The timestamp is kept in
/// the source's own format and may or may not carry an offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: String,
    pub noise_equivalent: f64,
    pub noise_max: f64,
    pub noise_min: f64,
}

impl Reading {
    pub fn new(timestamp: impl Into<String>, laeq: f64, lamax: f64, lamin: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            noise_equivalent: laeq,
            noise_max: lamax,
            noise_min: lamin,
        }
    }
}

/// Canonical point shared by the history and live views.
///
/// `lamin <= laeq <= lamax` is expected but never enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub timestamp: String,
    pub laeq: f64,
    pub lamax: f64,
    pub lamin: f64,
}

impl NormalizedPoint {
    /// Map the three noise fields verbatim under a replacement timestamp.
    pub fn from_reading(reading: &Reading, timestamp: String) -> Self {
        Self {
            timestamp,
            laeq: reading.noise_equivalent,
            lamax: reading.noise_max,
            lamin: reading.noise_min,
        }
    }
}

/// One sample of the live chart: epoch milliseconds and the A-weighted level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    pub t: i64,
    pub dba: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    SensorCommunity,
    Nightingale,
}

impl SensorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorSource::SensorCommunity => "sensorcommunity",
            SensorSource::Nightingale => "nightingale",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, NoiseError> {
        match raw.trim().to_lowercase().as_str() {
            "sensorcommunity" => Ok(SensorSource::SensorCommunity),
            "nightingale" => Ok(SensorSource::Nightingale),
            _ => Err(NoiseError::UnknownSource(raw.to_string())),
        }
    }
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a sensor sits and which network feeds it. `source` is `None` when
/// the backend reported a source this engine does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub country_code: String,
    pub indoor: bool,
    pub source: Option<SensorSource>,
}

/// Map marker entry for the sensor overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub source: Option<SensorSource>,
}

/// History range requested by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    AllTime,
    Day,
    Week,
    Month,
}

impl RangeMode {
    /// Path segment used by the backend API.
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeMode::AllTime => "alltime",
            RangeMode::Day => "day",
            RangeMode::Week => "week",
            RangeMode::Month => "month",
        }
    }

    /// Intraday views bucket per minute, everything else per calendar day.
    pub fn granularity(&self) -> Granularity {
        match self {
            RangeMode::Day => Granularity::HourMinute,
            _ => Granularity::CalendarDay,
        }
    }
}

impl FromStr for RangeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alltime" | "all" => Ok(RangeMode::AllTime),
            "day" | "today" => Ok(RangeMode::Day),
            "week" => Ok(RangeMode::Week),
            "month" => Ok(RangeMode::Month),
            other => Err(format!("unknown range mode '{}'", other)),
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
