// Converts raw device samples into canonical telemetry records.

use crate::geo::{GeoPoint, haversine_m};

use super::{FILL_VALUE, RawRunData, Telemetry};

/// Standard atmosphere constants for deriving altitude from barometric
/// pressure when no GPS altitude is available.
const SEA_LEVEL_PRESSURE_HPA: f64 = 1013.25;
const BAROMETRIC_EXPONENT: f64 = 0.190_284;
const BAROMETRIC_SCALE_M: f64 = 44_330.;

#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    /// Drop records carrying a fill value or NaN in a required field
    /// (timestamp, latitude, longitude) instead of passing them through
    /// with sentinels.
    pub strict: bool,
    /// Sentinel written into fields with no usable value.
    pub fill: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            fill: FILL_VALUE,
        }
    }
}

/// Converts raw device samples into canonical telemetry records.
///
/// Each output field resolves as `raw.*` first, then the sample's derived
/// top-level field, then the fill sentinel. Consecutive records with
/// identical coordinates to the previously *accepted* record are dropped,
/// with no distance credited. Records without any usable timestamp are
/// always dropped: they cannot be ordered into the session buffer.
///
/// Pure function; the only failure mode is an empty output for empty input.
pub fn normalize(samples: &[RawRunData], options: &NormalizeOptions) -> Vec<Telemetry> {
    let mut output: Vec<Telemetry> = Vec::with_capacity(samples.len());

    for sample in samples {
        let Some(timestamp_ms) = sample.raw.timestamp_ms.or(sample.timestamp_ms) else {
            continue;
        };

        let latitude = resolve(sample.raw.latitude, sample.latitude, options.fill);
        let longitude = resolve(sample.raw.longitude, sample.longitude, options.fill);
        let altitude = resolve_altitude(sample, options.fill);
        let steps = resolve(sample.raw.steps, None, options.fill);
        let cadence = resolve(None, sample.cadence, options.fill);
        let heart_rate = sample
            .raw
            .heart_rate
            .filter(|v| v.is_finite())
            .or(sample.heart_rate.filter(|v| v.is_finite()));

        if options.strict && (latitude == options.fill || longitude == options.fill) {
            continue;
        }

        // dedup against the last accepted record; a repeated fix credits no
        // distance and produces no record at all. Fixless records are never
        // deduped, they still carry sensor payload.
        if let Some(prev) = output.last()
            && latitude != options.fill
            && longitude != options.fill
            && prev.latitude == latitude
            && prev.longitude == longitude
        {
            continue;
        }

        let (distance_from_prev, pace) = match output.last() {
            Some(prev)
                if prev.has_position() && latitude != options.fill && longitude != options.fill =>
            {
                let dist = haversine_m(prev.position(), GeoPoint::new(latitude, longitude));
                let dt_ms = timestamp_ms.saturating_sub(prev.timestamp_ms);
                let pace = if dist > 0. && dt_ms > 0 {
                    (dt_ms as f64 / 1000.) / (dist / 1000.)
                } else {
                    options.fill
                };
                (dist, pace)
            }
            _ => (0., options.fill),
        };

        output.push(Telemetry {
            timestamp_ms,
            latitude,
            longitude,
            distance_from_prev,
            pace,
            altitude,
            steps,
            cadence,
            heart_rate,
            is_running: true,
        });
    }

    output
}

fn resolve(raw: Option<f64>, derived: Option<f64>, fill: f64) -> f64 {
    raw.filter(|v| v.is_finite())
        .or(derived.filter(|v| v.is_finite()))
        .unwrap_or(fill)
}

/// Altitude resolves raw GPS altitude first, then the derived field, then a
/// barometric estimate from raw pressure, then the fill sentinel.
fn resolve_altitude(sample: &RawRunData, fill: f64) -> f64 {
    let resolved = resolve(sample.raw.altitude, sample.altitude, fill);
    if resolved != fill {
        return resolved;
    }
    match sample.raw.pressure.filter(|p| p.is_finite() && *p > 0.) {
        Some(pressure) => {
            BAROMETRIC_SCALE_M * (1. - (pressure / SEA_LEVEL_PRESSURE_HPA).powf(BAROMETRIC_EXPONENT))
        }
        None => fill,
    }
}
