use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::mpsc::Receiver,
};

use log::error;

use crate::{GhostrunError, session::SessionUpdate};

/// Streams session updates to a jsonl file, one update per line. Runs until
/// the sending side hangs up.
pub fn write_session(
    file: &PathBuf,
    update_receiver: Receiver<SessionUpdate>,
) -> Result<(), GhostrunError> {
    let session_file = File::create(file).map_err(|e| GhostrunError::WriterError { source: e })?;
    let mut session_file_writer = BufWriter::new(session_file);
    for update in &update_receiver {
        match serde_json::to_string(&update) {
            Ok(line) => {
                let _ = writeln!(session_file_writer, "{line}").map_err(|e| {
                    error!("Error while writing session update to output file: {e}");
                });
            }
            Err(e) => error!("Error serializing session update: {e}"),
        }
    }
    session_file_writer
        .flush()
        .map_err(|e| GhostrunError::WriterError { source: e })?;
    Ok(())
}
