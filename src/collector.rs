use std::{
    sync::mpsc::Sender,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::GhostrunError;
use crate::session::{RunningSession, SessionUpdate};
use crate::telemetry::SampleProducer;

const REFRESH_RATE_MS: u64 = 250;

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drives a live session: polls the producer at a fixed refresh rate, feeds
/// every pending sample plus one timer tick into the session, and broadcasts
/// the resulting updates to the rendering subscriber (and optionally to the
/// session writer).
///
/// The collector thread is the single writer of the session; subscribers
/// only ever see immutable update clones.
pub fn collect_session(
    mut producer: impl SampleProducer,
    mut session: RunningSession,
    update_sender: Sender<SessionUpdate>,
    writer_sender: Option<Sender<SessionUpdate>>,
) -> Result<RunningSession, GhostrunError> {
    producer.start()?;
    broadcast(
        session.start(wall_clock_ms()),
        &update_sender,
        writer_sender.as_ref(),
    )?;

    loop {
        thread::sleep(Duration::from_millis(REFRESH_RATE_MS));
        let now_ms = wall_clock_ms();

        let mut updates = Vec::new();
        while let Some(sample) = producer.sample()? {
            updates.extend(session.ingest(sample, now_ms));
        }
        updates.extend(session.tick(now_ms));
        broadcast(updates, &update_sender, writer_sender.as_ref())?;

        if producer.is_finished() {
            break;
        }
    }
    Ok(session)
}

/// Replays a recorded sample stream through the session on a virtual clock
/// taken from the sample timestamps, so hours of recording process in
/// milliseconds with identical state-machine behavior.
pub fn replay_session(
    mut producer: impl SampleProducer,
    mut session: RunningSession,
    update_sender: Sender<SessionUpdate>,
    writer_sender: Option<Sender<SessionUpdate>>,
) -> Result<RunningSession, GhostrunError> {
    producer.start()?;

    let mut now_ms = 0u64;
    let mut started = false;
    while let Some(sample) = producer.sample()? {
        if let Some(ts) = sample.raw.timestamp_ms.or(sample.timestamp_ms) {
            // the virtual clock never runs backwards
            now_ms = now_ms.max(ts);
        }
        if !started {
            broadcast(session.start(now_ms), &update_sender, writer_sender.as_ref())?;
            started = true;
        }

        let mut updates = session.ingest(sample, now_ms);
        updates.extend(session.tick(now_ms));
        broadcast(updates, &update_sender, writer_sender.as_ref())?;
    }
    Ok(session)
}

fn broadcast(
    updates: Vec<SessionUpdate>,
    update_sender: &Sender<SessionUpdate>,
    writer_sender: Option<&Sender<SessionUpdate>>,
) -> Result<(), GhostrunError> {
    for update in updates {
        if let Some(writer_sender) = writer_sender {
            writer_sender.send(update.clone())?;
        }
        update_sender.send(update)?;
    }
    Ok(())
}
