pub(crate) mod normalizer;
pub(crate) mod producer;

pub use normalizer::{NormalizeOptions, normalize};
pub use producer::{JsonlSampleProducer, SampleProducer};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Sentinel written into numeric telemetry fields when neither the raw sensor
/// value nor the derived fallback is available.
pub const FILL_VALUE: f64 = -1.;

/// Unprocessed sensor values as delivered by the device, before any
/// derivation. Every field is optional: sensors drop out independently.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawSensorValues {
    pub timestamp_ms: Option<u64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// GPS altitude in meters
    pub altitude: Option<f64>,
    /// Barometric pressure in hPa
    pub pressure: Option<f64>,
    /// Cumulative step count since the pedometer started
    pub steps: Option<f64>,
    pub heart_rate: Option<f64>,
}

/// One device sample before normalization. Carries the `raw` sub-record of
/// unprocessed sensor values alongside possibly-derived top-level fields;
/// normalization prefers `raw.*` and falls back to the derived field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawRunData {
    pub timestamp_ms: Option<u64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Derived pace in sec/km, if the device computed one
    pub pace: Option<f64>,
    /// Derived cadence in steps/min, if the device computed one
    pub cadence: Option<f64>,
    pub heart_rate: Option<f64>,
    pub raw: RawSensorValues,
}

/// One normalized running sample. Read-only once appended to the session
/// buffer; the buffer is strictly non-decreasing in `timestamp_ms`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Telemetry {
    /// Milliseconds since epoch
    pub timestamp_ms: u64,
    /// Latitude in decimal degrees, `FILL_VALUE` when the fix was lost
    pub latitude: f64,
    /// Longitude in decimal degrees, `FILL_VALUE` when the fix was lost
    pub longitude: f64,
    /// Meters traveled since the previous accepted sample
    pub distance_from_prev: f64,
    /// Instantaneous pace in sec/km, `FILL_VALUE` while standing still
    pub pace: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Cumulative step count, `FILL_VALUE` without a pedometer
    pub steps: f64,
    /// Cadence in steps/min
    pub cadence: f64,
    pub heart_rate: Option<f64>,
    /// False while the session is paused or stopped off-course
    pub is_running: bool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            latitude: FILL_VALUE,
            longitude: FILL_VALUE,
            distance_from_prev: 0.,
            pace: FILL_VALUE,
            altitude: FILL_VALUE,
            steps: FILL_VALUE,
            cadence: FILL_VALUE,
            heart_rate: None,
            is_running: true,
        }
    }
}

impl Telemetry {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Whether this sample carries a usable GPS fix.
    pub fn has_position(&self) -> bool {
        self.latitude != FILL_VALUE && self.longitude != FILL_VALUE
    }
}
