use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{NoiseError, Result};
use crate::model::{RangeMode, Reading, SensorSummary};
use crate::settings::ApiSettings;
use crate::source::wire::{DisplayRecord, NoiseRecord, SensorRecord};
use crate::source::{HistoricalBatch, NoiseSource};

/// Backend API client.
///
/// Routes: `GET {base}/recentdata/{id}`, `GET {base}/{mode}/{id}`,
/// `GET {base}/allsensors`.
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| NoiseError::FetchFailure(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self.client.get(&url)
            .send()
            .await
            .map_err(|e| NoiseError::FetchFailure(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(NoiseError::FetchFailure(format!("{}: HTTP {}", url, resp.status())));
        }

        resp.json::<T>()
            .await
            .map_err(|e| NoiseError::FetchFailure(format!("{}: invalid body: {}", url, e)))
    }
}

#[async_trait]
impl NoiseSource for HttpSource {
    async fn fetch_recent(&self, sensor_id: &str) -> Result<Reading> {
        let record: NoiseRecord = self.get_json(&format!("recentdata/{}", sensor_id)).await?;
        Ok(record.into_reading())
    }

    async fn fetch_historical(&self, sensor_id: &str, range: RangeMode) -> Result<HistoricalBatch> {
        let record: DisplayRecord = self.get_json(&format!("{}/{}", range.as_str(), sensor_id)).await?;
        Ok(record.into_batch())
    }

    async fn fetch_all_sensors(&self) -> Result<Vec<SensorSummary>> {
        let records: Vec<SensorRecord> = self.get_json("allsensors").await?;
        Ok(records.into_iter().map(SensorSummary::from).collect())
    }

    fn name(&self) -> &str {
        "http"
    }
}
