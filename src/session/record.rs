// The finalized running record handed to the persistence collaborator.

use std::{fs::File, io::BufWriter, path::Path};

use serde::{Deserialize, Serialize};

use crate::GhostrunError;
use crate::telemetry::Telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Solo,
    Ghost,
    Course,
}

/// Aggregate numbers of a finished run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Total distance in meters
    pub distance: f64,
    /// Total elevation gain in meters
    pub elevation_gain: f64,
    /// Total elevation loss in meters
    pub elevation_loss: f64,
    /// Pause-aware duration in milliseconds
    pub duration: u64,
    /// Average pace in sec/km
    pub avg_pace: f64,
    /// Estimated calories burned
    pub calories: f64,
    /// Average heart rate in bpm, 0 without a sensor
    pub avg_bpm: f64,
    /// Average cadence in steps/min, 0 without a pedometer
    pub avg_cadence: f64,
}

/// A finalized run, ready for the upload/persistence collaborator. The
/// engine performs no network I/O itself; `save` writes a local JSON file
/// and any upload happens outside this crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub name: String,
    pub mode: RunMode,
    #[serde(rename = "started_at")]
    pub started_at_ms: u64,
    pub record: RunSummary,
    pub telemetries: Vec<Telemetry>,
    pub has_paused: bool,
    pub is_public: bool,
}

impl RunRecord {
    /// Writes the record as JSON. On failure the caller keeps the record
    /// (and the session it came from) and may retry.
    pub fn save(&self, path: &Path) -> Result<(), GhostrunError> {
        let file = File::create(path).map_err(|e| GhostrunError::RecordSaveError { source: e })?;
        serde_json::to_writer(BufWriter::new(file), self)
            .map_err(|e| GhostrunError::RecordSerializeError { source: e })?;
        Ok(())
    }
}
