use std::time::Duration;

use crate::model::SensorSource;
use crate::settings::LiveSettings;

/// How a live subscription polls, keyed on the sensor's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingPolicy {
    /// Poll every `interval`; every successful poll is also a graph sample.
    Fixed { interval: Duration },
    /// Poll every `interval` for the latest reading, but append a graph
    /// sample only once `spacing` has passed since the previous one.
    Decoupled { interval: Duration, spacing: Duration },
    /// No polling at all.
    Disabled,
}

impl PollingPolicy {
    pub fn from_source(source: Option<SensorSource>, settings: &LiveSettings) -> Self {
        match source {
            Some(SensorSource::SensorCommunity) => PollingPolicy::Fixed {
                interval: Duration::from_secs(settings.sensorcommunity_interval_secs.max(1)),
            },
            Some(SensorSource::Nightingale) => PollingPolicy::Decoupled {
                interval: Duration::from_secs(settings.nightingale_interval_secs.max(1)),
                spacing: Duration::from_millis(settings.nightingale_sample_spacing_ms),
            },
            None => PollingPolicy::Disabled,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            PollingPolicy::Fixed { interval } | PollingPolicy::Decoupled { interval, .. } => Some(*interval),
            PollingPolicy::Disabled => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, PollingPolicy::Disabled)
    }

    /// Whether a reading completed at `now_ms` becomes a graph sample, given
    /// the time of the previous sample.
    pub fn admits_sample(&self, last_sample_ms: Option<i64>, now_ms: i64) -> bool {
        match self {
            PollingPolicy::Fixed { .. } => true,
            PollingPolicy::Decoupled { spacing, .. } => match last_sample_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= spacing.as_millis() as i64,
            },
            PollingPolicy::Disabled => false,
        }
    }
}
