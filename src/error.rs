use thiserror::Error;

/// Failure modes of the normalization and live-sampling engine.
///
/// None of these are fatal to the process: each one degrades a single
/// reading or a single sensor's liveness.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoiseError {
    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("Unparseable timestamp: {0:?}")]
    UnparseableTimestamp(String),
    #[error("Fetch failed: {0}")]
    FetchFailure(String),
    #[error("Unknown sensor source: {0:?}")]
    UnknownSource(String),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

pub type Result<T> = std::result::Result<T, NoiseError>;
