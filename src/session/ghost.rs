// Time-synchronized replay of a previously recorded run.

use itertools::Itertools;

use crate::geo::haversine_m;
use crate::telemetry::{FILL_VALUE, Telemetry};

/// Resamples a sparse recorded telemetry sequence to a fixed time step.
///
/// Position, altitude, pace, steps and heart rate are linearly interpolated
/// between the two recorded points bracketing each resampled timestamp. The
/// first and last original points bound the output; there is no
/// extrapolation past the recording. Inputs shorter than two points are
/// returned as-is.
pub fn resample(points: &[Telemetry], step_ms: u64) -> Vec<Telemetry> {
    if points.len() < 2 || step_ms == 0 {
        return points.to_vec();
    }

    let first_ms = points[0].timestamp_ms;
    let last_ms = points[points.len() - 1].timestamp_ms;
    let mut output = Vec::with_capacity(((last_ms - first_ms) / step_ms + 2) as usize);

    let mut target_ms = first_ms;
    for (a, b) in points.iter().tuple_windows() {
        while target_ms <= last_ms && target_ms < b.timestamp_ms {
            output.push(interpolate(a, b, target_ms));
            target_ms += step_ms;
        }
    }
    // the recording's final point always closes the sequence
    if output.last().map(|t| t.timestamp_ms) != Some(last_ms) {
        output.push(points[points.len() - 1].clone());
    }

    // distances between resampled neighbors, so ghost consumers see the same
    // shape of record as live telemetry
    for i in 1..output.len() {
        if output[i].has_position() && output[i - 1].has_position() {
            output[i].distance_from_prev =
                haversine_m(output[i - 1].position(), output[i].position());
        }
    }

    output
}

fn interpolate(a: &Telemetry, b: &Telemetry, target_ms: u64) -> Telemetry {
    let span = b.timestamp_ms.saturating_sub(a.timestamp_ms);
    let fraction = if span == 0 {
        0.
    } else {
        (target_ms - a.timestamp_ms) as f64 / span as f64
    };
    let lerp = |from: f64, to: f64| {
        if from == FILL_VALUE || to == FILL_VALUE {
            from
        } else {
            from + (to - from) * fraction
        }
    };

    Telemetry {
        timestamp_ms: target_ms,
        latitude: lerp(a.latitude, b.latitude),
        longitude: lerp(a.longitude, b.longitude),
        distance_from_prev: 0.,
        pace: lerp(a.pace, b.pace),
        altitude: lerp(a.altitude, b.altitude),
        steps: lerp(a.steps, b.steps),
        cadence: lerp(a.cadence, b.cadence),
        heart_rate: match (a.heart_rate, b.heart_rate) {
            (Some(from), Some(to)) => Some(from + (to - from) * fraction),
            (from, _) => from,
        },
        is_running: a.is_running,
    }
}

/// Returns the point whose `key_fn` timestamp is closest to `target_ms`.
///
/// Targets before the first point clamp to the first, targets past the last
/// clamp to the last, and exact ties resolve to the earlier point. Empty
/// input yields `None`; callers treat that as a no-op tick.
pub fn find_closest<F>(points: &[Telemetry], target_ms: u64, key_fn: F) -> Option<&Telemetry>
where
    F: Fn(&Telemetry) -> u64,
{
    let idx = points.partition_point(|t| key_fn(t) < target_ms);
    match (points.get(idx.wrapping_sub(1)), points.get(idx)) {
        (None, after) => after,
        (before, None) => before,
        (Some(before), Some(after)) => {
            let d_before = target_ms - key_fn(before);
            let d_after = key_fn(after) - target_ms;
            if d_before <= d_after { Some(before) } else { Some(after) }
        }
    }
}

/// Replay state for an attached ghost run.
///
/// The resampled sequence is immutable after construction; consumption is an
/// index cursor that only moves forward. Once the nearest-point lookup
/// advances past an index, earlier points are never revisited, and no
/// allocation happens per tick.
pub struct GhostReplay {
    resampled: Vec<Telemetry>,
    cursor: usize,
}

impl GhostReplay {
    /// Pre-processes a recorded run for replay. Timestamps are rebased to
    /// the recording's own start, so lookups compare directly against the
    /// live session's elapsed time.
    pub fn new(recorded: &[Telemetry], step_ms: u64) -> Self {
        let rebased: Vec<Telemetry> = match recorded.first() {
            Some(first) => {
                let start_ms = first.timestamp_ms;
                recorded
                    .iter()
                    .map(|t| Telemetry {
                        timestamp_ms: t.timestamp_ms.saturating_sub(start_ms),
                        ..t.clone()
                    })
                    .collect()
            }
            None => Vec::new(),
        };
        Self {
            resampled: resample(&rebased, step_ms),
            cursor: 0,
        }
    }

    /// The ghost sample nearest to the current elapsed time, advancing the
    /// cursor. Points behind the returned one are consumed for good; a
    /// lookup earlier than the cursor simply returns the cursor position.
    pub fn advance(&mut self, elapsed_ms: u64) -> Option<&Telemetry> {
        let remaining = &self.resampled[self.cursor.min(self.resampled.len())..];
        let found = find_closest(remaining, elapsed_ms, |t| t.timestamp_ms)?;
        let offset = remaining
            .iter()
            .position(|t| t.timestamp_ms == found.timestamp_ms)
            .unwrap_or(0);
        self.cursor += offset;
        self.resampled.get(self.cursor)
    }

    pub fn resampled(&self) -> &[Telemetry] {
        &self.resampled
    }

    /// Points not yet consumed by the replay cursor.
    pub fn remaining(&self) -> usize {
        self.resampled.len().saturating_sub(self.cursor)
    }
}
