use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::error::{NoiseError, Result};
use crate::history::{aggregate_daily, filter_range};
use crate::model::{RangeMode, Reading, SensorLocation, SensorSource, SensorSummary};
use crate::source::{HistoricalBatch, NoiseSource};

#[derive(Debug, Clone)]
struct MockSensor {
    location: Option<SensorLocation>,
    readings: Vec<Reading>,
}

/// In-process source with scripted live responses and canned history.
///
/// `fetch_recent` pops the script first; once it runs dry every call gets a
/// synthetic reading stamped with the current UTC time.
pub struct MockSource {
    sensors: Mutex<BTreeMap<String, MockSensor>>,
    script: Mutex<VecDeque<Result<Reading>>>,
    latency: Duration,
    today: Option<NaiveDate>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            sensors: Mutex::new(BTreeMap::new()),
            script: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            today: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_sensor(self, id: &str, location: Option<SensorLocation>, readings: Vec<Reading>) -> Self {
        lock(&self.sensors).insert(id.to_string(), MockSensor { location, readings });
        self
    }

    /// Delay applied to every `fetch_recent`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pin the date range windows are computed against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn push_recent(&self, result: Result<Reading>) {
        lock(&self.script).push_back(result);
    }

    pub fn set_location(&self, id: &str, location: Option<SensorLocation>) {
        if let Some(sensor) = lock(&self.sensors).get_mut(id) {
            sensor.location = location;
        }
    }

    /// Number of `fetch_recent` calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `fetch_recent` calls that were outstanding at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// A Paris nightingale device with five weeks of quarter-hourly history.
    pub fn demo() -> Self {
        let today = Utc::now().date_naive();
        let location = SensorLocation {
            latitude: 48.8566,
            longitude: 2.3522,
            altitude: 35.0,
            country_code: "FR".to_string(),
            indoor: false,
            source: Some(SensorSource::Nightingale),
        };
        let mut readings = Vec::new();
        for day in (0..35).rev() {
            let date = today - chrono::Duration::days(day);
            for slot in 0..96u32 {
                let Some(at) = date.and_hms_opt(slot / 4, (slot % 4) * 15, 0) else {
                    continue;
                };
                let laeq = synthetic_level(slot as usize + day as usize * 96);
                readings.push(Reading::new(
                    at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    laeq,
                    laeq + 9.5,
                    laeq - 7.0,
                ));
            }
        }
        Self::new().with_sensor("demo", Some(location), readings)
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// Smooth deterministic level between roughly 40 and 64 dB.
fn synthetic_level(n: usize) -> f64 {
    let x = n as f64;
    let level = 52.0 + 8.0 * (x / 7.0).sin() + 4.0 * (x / 2.3).cos();
    (level * 10.0).round() / 10.0
}

#[async_trait]
impl NoiseSource for MockSource {
    async fn fetch_recent(&self, sensor_id: &str) -> Result<Reading> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = lock(&self.script).pop_front();
        match scripted {
            Some(result) => result,
            None => {
                debug!("mock: synthetic reading #{} for sensor {}", n, sensor_id);
                let laeq = synthetic_level(n);
                Ok(Reading::new(
                    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                    laeq,
                    laeq + 9.5,
                    laeq - 7.0,
                ))
            }
        }
    }

    async fn fetch_historical(&self, sensor_id: &str, range: RangeMode) -> Result<HistoricalBatch> {
        let sensor = lock(&self.sensors)
            .get(sensor_id)
            .cloned()
            .ok_or_else(|| NoiseError::FetchFailure(format!("unknown sensor {}", sensor_id)))?;

        let in_range = filter_range(&sensor.readings, range, self.today());
        let readings = match range {
            RangeMode::Day => in_range,
            _ => aggregate_daily(&in_range).iter().map(|day| day.to_reading()).collect(),
        };

        Ok(HistoricalBatch { readings, location: sensor.location })
    }

    async fn fetch_all_sensors(&self) -> Result<Vec<SensorSummary>> {
        Ok(lock(&self.sensors)
            .iter()
            .map(|(id, sensor)| SensorSummary {
                id: id.clone(),
                latitude: sensor.location.as_ref().map(|l| l.latitude),
                longitude: sensor.location.as_ref().map(|l| l.longitude),
                country: sensor.location.as_ref().map(|l| l.country_code.clone()),
                source: sensor.location.as_ref().and_then(|l| l.source),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
