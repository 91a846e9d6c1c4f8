use serde::{Deserialize, Serialize};

use crate::GhostrunError;

const CONFIG_FILE_NAME: &str = "config.json";

/// Tunable thresholds and policy timeouts of the session engine.
///
/// The defaults encode the product's current behavior; everything here can
/// be overridden from the local config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How close to the course start the runner must be before the
    /// pre-start countdown begins, meters
    pub start_sync_threshold_m: f64,
    /// Corridor width around the course polyline, meters
    pub off_course_threshold_m: f64,
    /// How close to the course terminal point counts as finishing, meters
    pub course_complete_threshold_m: f64,
    /// Pre-start countdown once the start position is synchronized, ms
    pub countdown_ms: u64,
    /// How long a runner may be outside the corridor before the session
    /// flags them as stopped, ms
    pub off_course_grace_ms: u64,
    /// Interval of the repeating reminder while stopped off-course, ms
    pub off_course_reminder_interval_ms: u64,
    /// Off-course time after which course tracking is abandoned, ms
    pub off_course_cancel_timeout_ms: u64,
    /// Countdown before resuming from a pause, ms; 0 resumes immediately
    pub resume_countdown_ms: u64,
    /// Sample-to-sample distance above this is a GPS glitch, meters
    pub max_sample_jump_m: f64,
    /// Altitude changes below this are barometric jitter, meters
    pub elevation_noise_m: f64,
    /// Fixed step of the ghost replay resampling, ms
    pub resample_step_ms: u64,
    /// Body weight for the calorie estimate, kg
    pub body_weight_kg: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_sync_threshold_m: 20.,
            off_course_threshold_m: 50.,
            course_complete_threshold_m: 20.,
            countdown_ms: 3_000,
            off_course_grace_ms: 10_000,
            off_course_reminder_interval_ms: 30_000,
            off_course_cancel_timeout_ms: 600_000,
            resume_countdown_ms: 0,
            max_sample_jump_m: 100.,
            elevation_noise_m: 2.,
            resample_step_ms: 250,
            body_weight_kg: 70.,
        }
    }
}

impl SessionConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("ghostrun").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            serde_json::from_reader(file).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<(), GhostrunError> {
        let config_dir = dirs::config_dir()
            .ok_or(GhostrunError::NoConfigDir)?
            .join("ghostrun");
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| GhostrunError::ConfigIOError { source: e })?;
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| GhostrunError::ConfigSerializeError { source: e })?;
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), contents)
            .map_err(|e| GhostrunError::ConfigIOError { source: e })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_json() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.off_course_threshold_m, config.off_course_threshold_m);
        assert_eq!(parsed.resample_step_ms, config.resample_step_ms);
    }
}
