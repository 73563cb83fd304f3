use std::sync::Arc;

use chrono::Timelike;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{Thresholds, Verdict};
use crate::error::Result;
use crate::history::bucket;
use crate::live::{LiveSampler, LiveSubscription, PollingPolicy};
use crate::model::{NormalizedPoint, RangeMode, Reading, SensorLocation, SensorSource, SensorSummary};
use crate::normalize::{localize, to_iso, ZoneHint};
use crate::settings::{LiveSettings, Settings};
use crate::source::NoiseSource;
use crate::timezone;

/// A sensor's location with its timezone, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedSensor {
    pub location: SensorLocation,
    pub zone: Option<Tz>,
}

impl LocatedSensor {
    pub fn new(location: SensorLocation) -> Self {
        let zone = match timezone::resolve(location.latitude, location.longitude) {
            Ok(tz) => Some(tz),
            Err(e) => {
                warn!("{}; readings will not be localized", e);
                None
            }
        };
        Self { location, zone }
    }

    pub fn source(&self) -> Option<SensorSource> {
        self.location.source
    }
}

/// A reading ready for display: timestamp in sensor-local time when possible,
/// classified against the day or night limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    pub point: NormalizedPoint,
    pub localized: bool,
    pub night: bool,
    pub verdict: Verdict,
}

/// Everything one dashboard session shows for a sensor.
#[derive(Debug, Clone)]
pub struct SensorView {
    pub sensor_id: String,
    pub range: RangeMode,
    pub sensor: Option<LocatedSensor>,
    pub history: Vec<NormalizedPoint>,
}

impl SensorView {
    /// A view with no history and no known location. Live polling stays off.
    pub fn empty(sensor_id: &str, range: RangeMode) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            range,
            sensor: None,
            history: Vec::new(),
        }
    }

    pub fn source(&self) -> Option<SensorSource> {
        self.sensor.as_ref().and_then(LocatedSensor::source)
    }

    pub fn zone(&self) -> Option<Tz> {
        self.sensor.as_ref().and_then(|s| s.zone)
    }
}

pub struct SensorPipeline {
    source: Arc<dyn NoiseSource>,
    sampler: LiveSampler,
    live: LiveSettings,
    thresholds: Thresholds,
}

impl SensorPipeline {
    pub fn new(source: Arc<dyn NoiseSource>, settings: &Settings) -> Self {
        Self {
            sampler: LiveSampler::new(source.clone(), &settings.live),
            source,
            live: settings.live.clone(),
            thresholds: settings.classify,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub async fn sensors(&self) -> Result<Vec<SensorSummary>> {
        self.source.fetch_all_sensors().await
    }

    /// Fetch a range of history, resolve the sensor's zone and bucket the readings.
    pub async fn open(&self, sensor_id: &str, range: RangeMode) -> Result<SensorView> {
        let batch = self.source.fetch_historical(sensor_id, range).await?;
        let sensor = batch.location.map(LocatedSensor::new);
        if let Some(located) = &sensor {
            info!(
                "Sensor {}: {} ({}), source={}",
                sensor_id,
                located.location.country_code,
                located.zone.map(|tz| tz.name()).unwrap_or("no zone"),
                located.source().map(|s| s.as_str()).unwrap_or("unknown"),
            );
        }

        let history = bucket(&batch.readings, range.granularity());
        info!("Sensor {}: {} readings -> {} {} points", sensor_id, batch.readings.len(), history.len(), range);

        Ok(SensorView {
            sensor_id: sensor_id.to_string(),
            range,
            sensor,
            history,
        })
    }

    /// Re-fetch history for a new range. The location and zone of an open
    /// view are kept; a changed source only takes effect on a new live start.
    pub async fn refresh_history(&self, view: &mut SensorView, range: RangeMode) -> Result<()> {
        let batch = self.source.fetch_historical(&view.sensor_id, range).await?;

        if let Some(location) = batch.location {
            match view.sensor.as_ref().map(LocatedSensor::source) {
                None => view.sensor = Some(LocatedSensor::new(location)),
                Some(previous) if previous != location.source => {
                    warn!(
                        "Sensor {}: source changed from {:?} to {:?}; restart the live subscription to switch",
                        view.sensor_id, previous, location.source
                    );
                }
                Some(_) => {}
            }
        }

        view.history = bucket(&batch.readings, range.granularity());
        view.range = range;
        Ok(())
    }

    pub fn policy_for(&self, view: &SensorView) -> PollingPolicy {
        PollingPolicy::from_source(view.source(), &self.live)
    }

    pub fn start_live(&self, view: &SensorView) -> LiveSubscription {
        self.sampler.start(&view.sensor_id, self.policy_for(view))
    }

    /// Latest reading for a sensor, localized when a sensor context is given.
    pub async fn recent(&self, sensor_id: &str, sensor: Option<&LocatedSensor>) -> Result<LiveReading> {
        let reading = self.source.fetch_recent(sensor_id).await?;
        Ok(self.describe(&reading, sensor))
    }

    /// Localize and classify one raw reading. Never fails: a reading that
    /// cannot be localized keeps its raw timestamp and is judged by day.
    pub fn describe(&self, reading: &Reading, sensor: Option<&LocatedSensor>) -> LiveReading {
        let zone = sensor.and_then(|s| s.zone);

        let local = zone.and_then(|tz| match localize(&reading.timestamp, ZoneHint::Utc, tz) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warn!("{}; showing reading unlocalized", e);
                None
            }
        });

        let (timestamp, night) = match &local {
            Some(dt) => (to_iso(dt), self.thresholds.is_night_hour(dt.hour())),
            None => (reading.timestamp.clone(), false),
        };

        LiveReading {
            point: NormalizedPoint::from_reading(reading, timestamp),
            localized: local.is_some(),
            night,
            verdict: self.thresholds.classify(reading.noise_equivalent, night),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;

    fn paris() -> LocatedSensor {
        LocatedSensor::new(SensorLocation {
            latitude: 48.8566,
            longitude: 2.3522,
            altitude: 35.0,
            country_code: "FR".to_string(),
            indoor: false,
            source: Some(SensorSource::Nightingale),
        })
    }

    fn pipeline() -> SensorPipeline {
        SensorPipeline::new(Arc::new(MockSource::new()), &Settings::default())
    }

    #[test]
    fn test_describe_localizes_and_uses_night_limit() {
        // 22:30 UTC is 23:30 in Paris in winter: night, limit 45.
        let reading = Reading::new("2024-01-15 22:30:00", 48.0, 55.0, 40.0);
        let out = pipeline().describe(&reading, Some(&paris()));
        assert!(out.localized);
        assert!(out.night);
        assert_eq!(out.point.timestamp, "2024-01-15T23:30:00+01:00");
        assert_eq!(out.verdict, Verdict::Caution);
    }

    #[test]
    fn test_describe_daytime() {
        let reading = Reading::new("2024-01-15T10:30:00Z", 48.0, 55.0, 40.0);
        let out = pipeline().describe(&reading, Some(&paris()));
        assert!(!out.night);
        assert_eq!(out.verdict, Verdict::Ok);
        assert_eq!(out.point.lamax, 55.0);
    }

    #[test]
    fn test_describe_without_location_keeps_raw_timestamp() {
        let reading = Reading::new("2024-01-15 22:30:00", 61.0, 70.0, 50.0);
        let out = pipeline().describe(&reading, None);
        assert!(!out.localized);
        assert_eq!(out.point.timestamp, "2024-01-15 22:30:00");
        assert_eq!(out.verdict, Verdict::High);
    }

    #[test]
    fn test_describe_unparseable_timestamp_is_not_fatal() {
        let reading = Reading::new("", 40.0, 45.0, 35.0);
        let out = pipeline().describe(&reading, Some(&paris()));
        assert!(!out.localized);
        assert_eq!(out.point.timestamp, "");
        assert_eq!(out.verdict, Verdict::Ok);
    }

    #[test]
    fn test_empty_view_disables_live_polling() {
        let pipeline = pipeline();
        let view = SensorView::empty("42", RangeMode::Week);
        assert!(view.history.is_empty());
        assert_eq!(view.zone(), None);
        assert_eq!(pipeline.policy_for(&view), PollingPolicy::Disabled);
        assert_eq!(pipeline.thresholds().day_limit, 55.0);
    }

    #[test]
    fn test_invalid_location_has_no_zone() {
        let mut location = paris().location;
        location.latitude = 123.0;
        let located = LocatedSensor::new(location);
        assert!(located.zone.is_none());
        assert_eq!(located.source(), Some(SensorSource::Nightingale));
    }
}
