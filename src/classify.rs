use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Severity of an instantaneous level against the WHO day/night limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "OK")]
    Ok,
    Caution,
    High,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Caution => "Caution",
            Verdict::High => "High",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Verdict::Ok => "#10B981",
            Verdict::Caution => "#F59E0B",
            Verdict::High => "#DC2626",
        }
    }

    /// Short health note shown next to the badge.
    pub fn advisory(&self) -> &'static str {
        match self {
            Verdict::Ok => {
                "Noise levels are within safe limits. Chronic exposure at this level is unlikely \
                 to put lasting strain on the cardiovascular system."
            }
            Verdict::Caution => {
                "Noise levels are approaching recommended limits. Prolonged exposure can raise \
                 heart rate and blood pressure; allow periods of quiet where possible."
            }
            Verdict::High => {
                "Noise levels are high. Repeated exposure at this level is associated with \
                 hypertension and other cardiovascular risks; limit exposure and protect sleep."
            }
        }
    }
}

/// Day/night limits in dB(A) and the night window in sensor-local hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub day_limit: f64,
    pub night_limit: f64,
    pub band: f64,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
}

impl Thresholds {
    /// WHO guideline values: 55 dB day (Lden), 45 dB night (Lnight), night 23:00-07:00.
    pub const WHO: Thresholds = Thresholds {
        day_limit: 55.0,
        night_limit: 45.0,
        band: 5.0,
        night_start_hour: 23,
        night_end_hour: 7,
    };

    pub fn limit(&self, night: bool) -> f64 {
        if night { self.night_limit } else { self.day_limit }
    }

    /// Below `limit-band` is OK, `[limit-band, limit+band]` Caution, above that High.
    pub fn classify(&self, level: f64, night: bool) -> Verdict {
        let limit = self.limit(night);
        if level < limit - self.band {
            Verdict::Ok
        } else if level <= limit + self.band {
            Verdict::Caution
        } else {
            Verdict::High
        }
    }

    pub fn is_night_hour(&self, hour: u32) -> bool {
        if self.night_start_hour > self.night_end_hour {
            hour >= self.night_start_hour || hour < self.night_end_hour
        } else {
            hour >= self.night_start_hour && hour < self.night_end_hour
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::WHO
    }
}

pub fn classify(level: f64, night: bool) -> Verdict {
    Thresholds::WHO.classify(level, night)
}

pub fn is_night(hour: u32) -> bool {
    Thresholds::WHO.is_night_hour(hour)
}

/// Night check on a timestamp already expressed in the sensor's zone.
pub fn is_night_at<Tz: TimeZone>(local: &DateTime<Tz>) -> bool {
    is_night(local.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    #[test]
    fn test_day_boundaries() {
        assert_eq!(classify(49.0, false), Verdict::Ok);
        assert_eq!(classify(49.99, false), Verdict::Ok);
        assert_eq!(classify(50.0, false), Verdict::Caution);
        assert_eq!(classify(60.0, false), Verdict::Caution);
        assert_eq!(classify(61.0, false), Verdict::High);
    }

    #[test]
    fn test_night_boundaries() {
        assert_eq!(classify(39.0, true), Verdict::Ok);
        assert_eq!(classify(40.0, true), Verdict::Caution);
        assert_eq!(classify(50.5, true), Verdict::High);
        assert_eq!(classify(50.0, true), Verdict::Caution);
        assert_eq!(classify(51.0, true), Verdict::High);
    }

    #[test]
    fn test_monotonic_in_level() {
        for night in [false, true] {
            let mut prev = Verdict::Ok;
            let mut level = 0.0;
            while level < 120.0 {
                let v = classify(level, night);
                assert!(v >= prev, "severity dropped at {} (night={})", level, night);
                prev = v;
                level += 0.25;
            }
        }
    }

    #[test]
    fn test_night_window() {
        for hour in [23, 0, 6] {
            assert!(is_night(hour), "hour {} should be night", hour);
        }
        for hour in [7, 12, 22] {
            assert!(!is_night(hour), "hour {} should be day", hour);
        }
    }

    #[test]
    fn test_night_uses_sensor_local_hour() {
        // 22:30 UTC is 07:30 in Tokyo (day) but 23:30 in Paris (night).
        let utc = chrono::Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        assert!(!is_night_at(&utc.with_timezone(&Tz::Asia__Tokyo)));
        assert!(is_night_at(&utc.with_timezone(&Tz::Europe__Paris)));
    }

    #[test]
    fn test_custom_window_without_wrap() {
        let t = Thresholds { night_start_hour: 1, night_end_hour: 5, ..Thresholds::WHO };
        assert!(t.is_night_hour(1));
        assert!(t.is_night_hour(4));
        assert!(!t.is_night_hour(5));
        assert!(!t.is_night_hour(0));
    }

    #[test]
    fn test_verdict_colors() {
        assert_eq!(Verdict::Ok.color(), "#10B981");
        assert_eq!(Verdict::Caution.color(), "#F59E0B");
        assert_eq!(Verdict::High.color(), "#DC2626");
        assert_eq!(Verdict::Caution.label(), "Caution");
    }
}
