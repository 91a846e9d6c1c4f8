// Incremental aggregation of the live dashboard metrics.

use serde::{Deserialize, Serialize};
use simple_moving_average::{SMA, SumTreeSMA};

use crate::geo::haversine_m;
use crate::telemetry::{FILL_VALUE, Telemetry};

/// Trailing samples feeding the recent pace/cadence windows. A single
/// sample-to-sample delta is far too noisy to display.
const RECENT_WINDOW: usize = 10;

/// Running burns roughly one kcal per kg of body weight per km.
const KCAL_PER_KG_KM: f64 = 1.036;

/// Aggregate metrics shown on the dashboard during and after a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_distance_m: f64,
    /// Total elapsed time over total distance, sec/km. 0 until distance accrues.
    pub average_pace_sec_km: f64,
    /// Pace over the trailing sample window, sec/km
    pub recent_pace_sec_km: f64,
    /// Cadence over the trailing sample window, steps/min
    pub recent_cadence_spm: f64,
    pub total_elevation_gain_m: f64,
    pub total_elevation_loss_m: f64,
    pub total_calories_kcal: f64,
    /// Latest heart rate reading, if any sensor delivered one
    pub heart_rate_bpm: Option<f64>,
}

/// Incrementally folds telemetry records into a `DashboardSnapshot`.
///
/// Numerically stable over long sessions: every metric is a running sum or a
/// fixed-size moving average, never a recomputation over the full buffer.
pub struct DashboardAggregator {
    snapshot: DashboardSnapshot,
    body_weight_kg: f64,
    max_sample_jump_m: f64,
    elevation_noise_m: f64,
    /// Altitude baseline for gain/loss, the last *recorded* altitude rather
    /// than the previous sample, so barometric jitter cannot accumulate
    baseline_altitude_m: Option<f64>,
    prev_steps: Option<(u64, f64)>,
    speed_window: SumTreeSMA<f64, f64, RECENT_WINDOW>,
    cadence_window: SumTreeSMA<f64, f64, RECENT_WINDOW>,
    heart_rate_sum: f64,
    heart_rate_count: usize,
    cadence_sum: f64,
    cadence_count: usize,
}

impl DashboardAggregator {
    pub fn new(body_weight_kg: f64, max_sample_jump_m: f64, elevation_noise_m: f64) -> Self {
        Self {
            snapshot: DashboardSnapshot::default(),
            body_weight_kg,
            max_sample_jump_m,
            elevation_noise_m,
            baseline_altitude_m: None,
            prev_steps: None,
            speed_window: SumTreeSMA::new(),
            cadence_window: SumTreeSMA::new(),
            heart_rate_sum: 0.,
            heart_rate_count: 0,
            cadence_sum: 0.,
            cadence_count: 0,
        }
    }

    /// Folds one new telemetry record into the live snapshot.
    ///
    /// `prev` is the previously accepted record and `elapsed_ms` the
    /// pause-aware session clock. Implausible GPS jumps contribute zero
    /// distance but the record itself stays in the session buffer.
    pub fn update(&mut self, prev: Option<&Telemetry>, new: &Telemetry, elapsed_ms: u64) {
        if new.is_running {
            self.update_distance(prev, new);
            self.update_elevation(new);
            self.update_cadence(new);
        }

        if let Some(bpm) = new.heart_rate {
            self.snapshot.heart_rate_bpm = Some(bpm);
            self.heart_rate_sum += bpm;
            self.heart_rate_count += 1;
        }

        if elapsed_ms > 0 && self.snapshot.total_distance_m > 0. {
            self.snapshot.average_pace_sec_km =
                (elapsed_ms as f64 / 1000.) / (self.snapshot.total_distance_m / 1000.);
        }
        self.snapshot.total_calories_kcal =
            (self.snapshot.total_distance_m / 1000.) * self.body_weight_kg * KCAL_PER_KG_KM;
    }

    fn update_distance(&mut self, prev: Option<&Telemetry>, new: &Telemetry) {
        let Some(prev) = prev.filter(|p| p.has_position()) else {
            return;
        };
        if !new.has_position() {
            return;
        }

        let delta_m = haversine_m(prev.position(), new.position());
        let dt_ms = new.timestamp_ms.saturating_sub(prev.timestamp_ms);

        // a jump beyond the plausible bound is a GPS glitch: keep the record,
        // credit no distance
        if delta_m > self.max_sample_jump_m {
            return;
        }

        self.snapshot.total_distance_m += delta_m;
        if dt_ms > 0 {
            self.speed_window.add_sample(delta_m / (dt_ms as f64 / 1000.));
            let avg_speed = self.speed_window.get_average();
            if avg_speed > 0. {
                self.snapshot.recent_pace_sec_km = 1000. / avg_speed;
            }
        }
    }

    fn update_elevation(&mut self, new: &Telemetry) {
        if new.altitude == FILL_VALUE {
            return;
        }
        match self.baseline_altitude_m {
            None => self.baseline_altitude_m = Some(new.altitude),
            Some(baseline) => {
                let delta = new.altitude - baseline;
                if delta > self.elevation_noise_m {
                    self.snapshot.total_elevation_gain_m += delta;
                    self.baseline_altitude_m = Some(new.altitude);
                } else if delta < -self.elevation_noise_m {
                    self.snapshot.total_elevation_loss_m += -delta;
                    self.baseline_altitude_m = Some(new.altitude);
                }
            }
        }
    }

    fn update_cadence(&mut self, new: &Telemetry) {
        let spm = if new.steps != FILL_VALUE {
            // cumulative pedometer counter: steps delta over the time delta
            let current = (new.timestamp_ms, new.steps);
            let spm = self.prev_steps.and_then(|(prev_ts, prev_steps)| {
                let dt_ms = new.timestamp_ms.saturating_sub(prev_ts);
                let delta = new.steps - prev_steps;
                (dt_ms > 0 && delta >= 0.).then(|| delta / (dt_ms as f64 / 60_000.))
            });
            self.prev_steps = Some(current);
            spm
        } else if new.cadence != FILL_VALUE {
            // no pedometer counter, trust the device-derived cadence
            Some(new.cadence)
        } else {
            None
        };

        if let Some(spm) = spm {
            self.cadence_window.add_sample(spm);
            self.snapshot.recent_cadence_spm = self.cadence_window.get_average();
            self.cadence_sum += spm;
            self.cadence_count += 1;
        }
    }

    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }

    /// Session-wide average heart rate for the finalized record.
    pub fn average_heart_rate_bpm(&self) -> f64 {
        if self.heart_rate_count == 0 {
            return 0.;
        }
        self.heart_rate_sum / self.heart_rate_count as f64
    }

    /// Session-wide average cadence for the finalized record.
    pub fn average_cadence_spm(&self) -> f64 {
        if self.cadence_count == 0 {
            return 0.;
        }
        self.cadence_sum / self.cadence_count as f64
    }
}
