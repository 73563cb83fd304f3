//! JSON shapes served by the backend API.
//!
//! Decoding is lenient: numbers may arrive as strings, the extreme fields
//! exist under two spellings, and an unknown `source` never fails a payload.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::model::{Reading, SensorLocation, SensorSource, SensorSummary};
use crate::source::HistoricalBatch;

/// `/recentdata/{id}` and the entries of `noiseResponses`.
#[derive(Debug, Clone, Deserialize)]
pub struct NoiseRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "noise_LAeq", default, deserialize_with = "lenient_f64")]
    pub laeq: Option<f64>,
    #[serde(rename = "noise_LAmax", alias = "noise_LA_max", default, deserialize_with = "lenient_f64")]
    pub lamax: Option<f64>,
    #[serde(rename = "noise_LAmin", alias = "noise_LA_min", default, deserialize_with = "lenient_f64")]
    pub lamin: Option<f64>,
}

impl NoiseRecord {
    /// Missing levels read as 0 dB and a missing timestamp as empty, the
    /// same placeholder the dashboard shows for a sensor with no data yet.
    pub fn into_reading(self) -> Reading {
        Reading::new(
            self.timestamp.unwrap_or_default(),
            self.laeq.unwrap_or(0.0),
            self.lamax.unwrap_or(0.0),
            self.lamin.unwrap_or(0.0),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub altitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub indoor: Option<bool>,
}

/// `/{mode}/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayRecord {
    #[serde(rename = "locationResponse", alias = "location", default)]
    pub location: Option<LocationRecord>,
    #[serde(rename = "noiseResponses", alias = "noises", default)]
    pub noises: Vec<NoiseRecord>,
    #[serde(default)]
    pub source: Option<String>,
}

impl DisplayRecord {
    pub fn into_batch(self) -> HistoricalBatch {
        let source = parse_source(self.source.as_deref());
        let location = self.location.and_then(|loc| {
            let (Some(latitude), Some(longitude)) = (loc.latitude, loc.longitude) else {
                warn!("Historical payload carries a location without coordinates");
                return None;
            };
            Some(SensorLocation {
                latitude,
                longitude,
                altitude: loc.altitude.unwrap_or(0.0),
                country_code: loc.country.unwrap_or_default(),
                indoor: loc.indoor.unwrap_or(false),
                source,
            })
        });

        HistoricalBatch {
            readings: self.noises.into_iter().map(NoiseRecord::into_reading).collect(),
            location,
        }
    }
}

/// `/allsensors` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl From<SensorRecord> for SensorSummary {
    fn from(record: SensorRecord) -> Self {
        SensorSummary {
            source: parse_source(record.source.as_deref()),
            id: record.id,
            latitude: record.latitude,
            longitude: record.longitude,
            country: record.country,
        }
    }
}

/// Unknown or placeholder sources become `None`, which disables live polling.
pub fn parse_source(raw: Option<&str>) -> Option<SensorSource> {
    let raw = raw?;
    match SensorSource::parse(raw) {
        Ok(source) => Some(source),
        Err(e) => {
            warn!("{}; live polling disabled for this sensor", e);
            None
        }
    }
}

/// Accepts a JSON number, a numeric string, or null.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Accepts a bool, `0`/`1`, or their string forms.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid sensor id: {}", other))),
    }
}
