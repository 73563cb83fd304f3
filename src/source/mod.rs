//! Data sources feeding the engine: the backend API, sensor.community, and
//! an in-process mock.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{RangeMode, Reading, SensorLocation, SensorSummary};

pub mod community;
pub mod http;
pub mod mock;
pub mod wire;

pub use community::CommunityClient;
pub use http::HttpSource;
pub use mock::MockSource;

/// A historical slice for one sensor plus where that sensor sits.
///
/// `location` is `None` when the backend did not report one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoricalBatch {
    pub readings: Vec<Reading>,
    pub location: Option<SensorLocation>,
}

/// Anything that can serve readings for a sensor.
#[async_trait]
pub trait NoiseSource: Send + Sync {
    /// Latest single reading. Timestamps come back as the source wrote them.
    async fn fetch_recent(&self, sensor_id: &str) -> Result<Reading>;

    async fn fetch_historical(&self, sensor_id: &str, range: RangeMode) -> Result<HistoricalBatch>;

    /// Every known sensor, for the map overview.
    async fn fetch_all_sensors(&self) -> Result<Vec<SensorSummary>>;

    fn name(&self) -> &str;
}
