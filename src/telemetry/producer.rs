use std::collections::VecDeque;
use std::path::PathBuf;

use log::info;

use crate::GhostrunError;

use super::RawRunData;

/// Source of raw device samples. The collector polls the producer at a fixed
/// refresh rate; on-device implementations wrap the platform location and
/// pedometer callbacks, test/replay implementations read recorded files.
pub trait SampleProducer {
    fn start(&mut self) -> Result<(), GhostrunError>;

    /// The next raw sample, or `None` when the source has nothing new. A
    /// dry spell is not an error: GPS signal loss simply means samples stop
    /// arriving for a while.
    fn sample(&mut self) -> Result<Option<RawRunData>, GhostrunError>;

    /// Whether the source can still deliver samples. Live producers never
    /// finish; replay producers finish when the file is exhausted.
    fn is_finished(&self) -> bool;
}

/// Replays raw samples recorded as one JSON object per line.
pub struct JsonlSampleProducer {
    source_file: PathBuf,
    samples: VecDeque<RawRunData>,
    started: bool,
}

impl JsonlSampleProducer {
    pub fn new(source_file: PathBuf) -> Self {
        Self {
            source_file,
            samples: VecDeque::new(),
            started: false,
        }
    }
}

impl SampleProducer for JsonlSampleProducer {
    fn start(&mut self) -> Result<(), GhostrunError> {
        if !self.source_file.exists() {
            return Err(GhostrunError::InvalidSampleFile {
                path: format!("{:?}", self.source_file),
            });
        }
        self.samples = serde_jsonlines::json_lines(&self.source_file)
            .map_err(|e| GhostrunError::SampleLoaderError { source: e })?
            .collect::<Result<VecDeque<RawRunData>, std::io::Error>>()
            .map_err(|e| GhostrunError::SampleLoaderError { source: e })?;
        self.started = true;
        info!(
            "Loaded {} raw samples from {:?}",
            self.samples.len(),
            self.source_file
        );
        Ok(())
    }

    fn sample(&mut self) -> Result<Option<RawRunData>, GhostrunError> {
        if !self.started {
            return Err(GhostrunError::SampleProducerError {
                description: "producer not started".to_string(),
            });
        }
        Ok(self.samples.pop_front())
    }

    fn is_finished(&self) -> bool {
        self.started && self.samples.is_empty()
    }
}
