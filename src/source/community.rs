use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{NoiseError, Result};
use crate::history::filter_range;
use crate::model::{RangeMode, Reading, SensorLocation, SensorSource, SensorSummary};
use crate::settings::{ApiSettings, CommunitySettings};
use crate::source::wire::{id_string, lenient_bool, lenient_f64};
use crate::source::{HistoricalBatch, NoiseSource};

#[derive(Debug, Clone, Deserialize)]
pub struct CommunitySensor {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunityLocation {
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

#[derive(Debug, Clone, Deserialize)]
pub struct DataValue {
    pub value_type: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
}

/// One entry of the sensor.community feeds. Timestamps are UTC without offset.
#[derive(Debug, Clone, Deserialize)]
pub struct CommunityRecord {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub sensor: CommunitySensor,
    pub location: CommunityLocation,
    #[serde(default)]
    pub sensordatavalues: Vec<DataValue>,
}

impl CommunityRecord {
    pub fn is_noise(&self) -> bool {
        self.sensordatavalues.iter().any(|v| v.value_type.starts_with("noise"))
    }

    fn value(&self, value_type: &str) -> Option<f64> {
        self.sensordatavalues
            .iter()
            .find(|v| v.value_type == value_type)
            .and_then(|v| v.value)
    }

    /// Missing extremes fall back to LAeq. `None` without an LAeq value.
    pub fn to_reading(&self) -> Option<Reading> {
        let laeq = self.value("noise_LAeq")?;
        Some(Reading::new(
            self.timestamp.clone().unwrap_or_default(),
            laeq,
            self.value("noise_LA_max").unwrap_or(laeq),
            self.value("noise_LA_min").unwrap_or(laeq),
        ))
    }

    pub fn to_location(&self) -> Option<SensorLocation> {
        Some(SensorLocation {
            latitude: self.location.latitude?,
            longitude: self.location.longitude?,
            altitude: self.location.altitude.unwrap_or(0.0),
            country_code: self.location.country.clone().unwrap_or_default(),
            indoor: self.location.indoor.unwrap_or(false),
            source: Some(SensorSource::SensorCommunity),
        })
    }

    pub fn to_summary(&self) -> SensorSummary {
        SensorSummary {
            id: self.sensor.id.clone(),
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            country: self.location.country.clone(),
            source: Some(SensorSource::SensorCommunity),
        }
    }
}

/// Keep only noise records, preserving feed order.
pub fn noise_records(records: Vec<CommunityRecord>) -> Vec<CommunityRecord> {
    records.into_iter().filter(CommunityRecord::is_noise).collect()
}

/// Direct client for the public sensor.community API.
pub struct CommunityClient {
    client: Client,
    feed_url: String,
    sensor_url: String,
}

impl CommunityClient {
    pub fn new(api: &ApiSettings, community: &CommunitySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs.max(1)))
            .user_agent(api.user_agent.clone())
            .build()
            .map_err(|e| NoiseError::FetchFailure(e.to_string()))?;

        Ok(Self {
            client,
            feed_url: community.feed_url.clone(),
            sensor_url: community.sensor_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_records(&self, url: &str) -> Result<Vec<CommunityRecord>> {
        debug!("GET {}", url);
        let resp = self.client.get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| NoiseError::FetchFailure(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(NoiseError::FetchFailure(format!("{}: HTTP {}", url, resp.status())));
        }

        resp.json::<Vec<CommunityRecord>>()
            .await
            .map_err(|e| NoiseError::FetchFailure(format!("{}: invalid body: {}", url, e)))
    }

    /// Noise records of the hourly feed across every sensor.
    pub async fn fetch_feed(&self) -> Result<Vec<CommunityRecord>> {
        let records = self.get_records(&self.feed_url).await?;
        let total = records.len();
        let noise = noise_records(records);
        info!("sensor.community feed: {} of {} records are noise sensors", noise.len(), total);
        Ok(noise)
    }

    pub async fn fetch_sensor(&self, sensor_id: &str) -> Result<Vec<CommunityRecord>> {
        let url = format!("{}/{}/", self.sensor_url, sensor_id);
        Ok(noise_records(self.get_records(&url).await?))
    }
}

#[async_trait]
impl NoiseSource for CommunityClient {
    async fn fetch_recent(&self, sensor_id: &str) -> Result<Reading> {
        let records = self.fetch_sensor(sensor_id).await?;
        // "YYYY-MM-DD HH:mm:ss" is zero-padded, so the string max is the newest.
        records
            .iter()
            .filter_map(CommunityRecord::to_reading)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .ok_or_else(|| NoiseError::FetchFailure(format!("no noise readings for sensor {}", sensor_id)))
    }

    async fn fetch_historical(&self, sensor_id: &str, range: RangeMode) -> Result<HistoricalBatch> {
        let records = self.fetch_sensor(sensor_id).await?;
        let location = records.iter().find_map(CommunityRecord::to_location);
        if location.is_none() {
            warn!("sensor.community sensor {} has no usable location", sensor_id);
        }
        let readings: Vec<Reading> = records.iter().filter_map(CommunityRecord::to_reading).collect();
        Ok(HistoricalBatch {
            readings: filter_range(&readings, range, Utc::now().date_naive()),
            location,
        })
    }

    async fn fetch_all_sensors(&self) -> Result<Vec<SensorSummary>> {
        let records = self.fetch_feed().await?;
        let mut seen = HashSet::new();
        Ok(records
            .iter()
            .filter(|r| seen.insert(r.sensor.id.clone()))
            .map(CommunityRecord::to_summary)
            .collect())
    }

    fn name(&self) -> &str {
        "sensor.community"
    }
}
