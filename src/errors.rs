// Error types for ghostrun

use crate::session::SessionUpdate;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum GhostrunError {
    // Errors while reading and broadcasting session updates
    #[snafu(display("Sample producer error"))]
    SampleProducerError { description: String },
    #[snafu(display("Error broadcasting session update"))]
    SessionBroadcastError {
        source: Box<SendError<SessionUpdate>>,
    },

    // Errors for the session writer and run finalization
    #[snafu(display("Error writing session file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error saving finalized run record"))]
    RecordSaveError { source: io::Error },
    #[snafu(display("Error serializing finalized run record"))]
    RecordSerializeError { source: serde_json::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Sample/course/ghost file loading errors
    #[snafu(display("Invalid sample file: {path}"))]
    InvalidSampleFile { path: String },
    #[snafu(display("Error loading sample file"))]
    SampleLoaderError { source: io::Error },
}

impl From<SendError<SessionUpdate>> for GhostrunError {
    fn from(value: SendError<SessionUpdate>) -> Self {
        GhostrunError::SessionBroadcastError {
            source: Box::new(value),
        }
    }
}
