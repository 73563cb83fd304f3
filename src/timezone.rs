use std::sync::LazyLock;

use chrono_tz::Tz;
use tracing::debug;
use tzf_rs::DefaultFinder;

use crate::error::{NoiseError, Result};

// Building the polygon index takes a few milliseconds; do it once per process.
static FINDER: LazyLock<DefaultFinder> = LazyLock::new(DefaultFinder::new);

/// Map a coordinate to its IANA timezone.
///
/// Offline and deterministic: the boundary polygons ship with the binary.
/// Coordinates outside every polygon fall back to the nautical `Etc/GMT±N`
/// zone for the longitude.
pub fn resolve(lat: f64, lon: f64) -> Result<Tz> {
    if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(NoiseError::InvalidCoordinate { lat, lon });
    }

    let name = FINDER.get_tz_name(lon, lat);
    if name.is_empty() {
        let fallback = nautical_zone(lon);
        debug!("No timezone polygon at ({}, {}), using {}", lat, lon, fallback);
        return zone_named(&fallback);
    }
    zone_named(name)
}

/// Look up a zone by its IANA identifier.
pub fn zone_named(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| NoiseError::UnknownTimezone(name.to_string()))
}

fn nautical_zone(lon: f64) -> String {
    let hours = (lon / 15.0).round() as i32;
    // Etc/ zones use POSIX sign convention: east of Greenwich is negative.
    match hours {
        0 => "Etc/GMT".to_string(),
        h if h > 0 => format!("Etc/GMT-{}", h),
        h => format!("Etc/GMT+{}", -h),
    }
}
