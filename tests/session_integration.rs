// Integration tests driving the full session engine through realistic
// course, ghost and free-run scenarios.

use ghostrun::geo::GeoPoint;
use ghostrun::session::{RunStatus, RunningSession, SegmentRole, SessionConfig};
use ghostrun::telemetry::{RawRunData, RawSensorValues};

fn sample(timestamp_ms: u64, lat: f64, lng: f64) -> RawRunData {
    RawRunData {
        raw: RawSensorValues {
            timestamp_ms: Some(timestamp_ms),
            latitude: Some(lat),
            longitude: Some(lng),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A course running ~111 m north along the prime meridian.
fn north_course() -> Vec<GeoPoint> {
    vec![GeoPoint::new(0., 0.), GeoPoint::new(0.001, 0.)]
}

fn config() -> SessionConfig {
    SessionConfig {
        countdown_ms: 3000,
        off_course_grace_ms: 0,
        ..Default::default()
    }
}

/// Runs a course session up to the point where course running is active.
fn course_session_started(config: SessionConfig) -> (RunningSession, u64) {
    let mut session = RunningSession::new(config);
    session.attach_course(north_course());
    session.start(0);

    // standing at the start point synchronizes and arms the countdown
    session.ingest(sample(0, 0., 0.), 0);
    assert_eq!(session.status(), RunStatus::ReadyCourseRunning);

    // countdown has not elapsed yet
    session.tick(2000);
    assert_eq!(session.status(), RunStatus::ReadyCourseRunning);

    session.tick(3000);
    assert_eq!(session.status(), RunStatus::CourseRunning);
    (session, 3000)
}

#[test]
fn test_course_run_to_completion() {
    let (mut session, started) = course_session_started(config());

    // the spec'd scenario: samples on-course at the start, middle and end
    session.ingest(sample(started + 1, 0.0000001, 0.), started + 1);
    assert_eq!(session.status(), RunStatus::CourseRunning);

    session.ingest(sample(started + 5000, 0.0005, 0.), started + 5000);
    assert_eq!(session.status(), RunStatus::CourseRunning);

    session.ingest(sample(started + 10_000, 0.001, 0.), started + 10_000);
    assert_eq!(session.status(), RunStatus::CompleteCourseRunning);

    // the frozen result includes the final leg the runner covered to finish
    let completed = session.completed_course().expect("frozen course dashboard").clone();
    assert!((completed.dashboard.total_distance_m - 111.2).abs() < 2.);
    assert_eq!(completed.telemetry_index, 2);

    // the live dashboard keeps growing after completion, the frozen one does not
    session.ingest(sample(started + 15_000, 0.0015, 0.), started + 15_000);
    assert!(session.dashboard().total_distance_m > completed.dashboard.total_distance_m + 50.);
    let frozen_after = session.completed_course().unwrap().dashboard.total_distance_m;
    assert!((frozen_after - 111.2).abs() < 2.);
}

#[test]
fn test_off_course_stop_and_recovery() {
    let (mut session, started) = course_session_started(config());

    session.ingest(sample(started + 1000, 0.0005, 0.), started + 1000);
    assert_eq!(session.status(), RunStatus::CourseRunning);

    // ~1.1 km east of the corridor
    session.ingest(sample(started + 2000, 0.0005, 0.01), started + 2000);
    assert_eq!(session.status(), RunStatus::Stopped);

    // telemetry recorded while stopped carries is_running = false
    let last = session.telemetries().last().unwrap();
    assert!(!last.is_running);

    // elapsed time is frozen while stopped
    let frozen = session.elapsed(started + 2000);
    session.tick(started + 60_000);
    assert_eq!(session.elapsed(started + 60_000), frozen);

    // back inside the corridor within the grace window
    session.ingest(sample(started + 70_000, 0.0006, 0.), started + 70_000);
    assert_eq!(session.status(), RunStatus::CourseRunning);
    assert!(session.telemetries().last().unwrap().is_running);
}

#[test]
fn test_off_course_grace_elapses_without_samples() {
    let (mut session, started) = course_session_started(SessionConfig {
        countdown_ms: 3000,
        off_course_grace_ms: 5000,
        ..Default::default()
    });

    // one sample off the corridor opens the grace window, no transition yet
    session.ingest(sample(started + 1000, 0.0005, 0.01), started + 1000);
    assert_eq!(session.status(), RunStatus::CourseRunning);

    // GPS drops out; the grace deadline passes on the timer alone
    session.tick(started + 2000);
    assert_eq!(session.status(), RunStatus::CourseRunning);
    session.tick(started + 7000);
    assert_eq!(session.status(), RunStatus::Stopped);
}

#[test]
fn test_off_course_hard_timeout_abandons_course() {
    let (mut session, started) = course_session_started(config());

    session.ingest(sample(started + 1000, 0.0005, 0.01), started + 1000);
    assert_eq!(session.status(), RunStatus::Stopped);

    // one second short of the hard timeout nothing changes
    session.tick(started + 1000 + 599_000);
    assert_eq!(session.status(), RunStatus::Stopped);

    session.tick(started + 1000 + 600_000);
    assert_eq!(session.status(), RunStatus::CancelCourseRunning);

    // recording continues as a free run, telemetry kept
    let before = session.telemetries().len();
    session.ingest(sample(started + 1000 + 600_500, 0.002, 0.01), started + 1000 + 600_500);
    assert_eq!(session.telemetries().len(), before + 1);
    assert!(session.telemetries().last().unwrap().is_running);
}

#[test]
fn test_pause_freezes_clock_and_flags_telemetry() {
    let mut session = RunningSession::new(SessionConfig::default());
    session.start(0);
    assert_eq!(session.status(), RunStatus::FreeRunning);

    session.ingest(sample(1000, 0., 0.), 1000);
    session.pause(10_000);
    assert_eq!(session.status(), RunStatus::Paused);
    assert_eq!(session.elapsed(50_000), 10_000);

    // distance does not accrue while paused
    let paused_distance = session.dashboard().total_distance_m;
    session.ingest(sample(20_000, 0.001, 0.), 20_000);
    assert_eq!(session.dashboard().total_distance_m, paused_distance);
    assert!(!session.telemetries().last().unwrap().is_running);

    // resume continues the clock from the frozen value
    session.resume(30_000);
    assert_eq!(session.status(), RunStatus::FreeRunning);
    assert_eq!(session.elapsed(30_000), 10_000);
    assert_eq!(session.elapsed(35_000), 15_000);

    let record = session.finalize("paused run".to_string(), false, 35_000);
    assert!(record.has_paused);
}

#[test]
fn test_resume_from_external_stop_after_countdown() {
    let mut session = RunningSession::new(SessionConfig {
        resume_countdown_ms: 2000,
        ..Default::default()
    });
    session.start(0);
    session.ingest(sample(1000, 0.0001, 0.), 1000);

    session.stop(2000);
    assert_eq!(session.status(), RunStatus::Stopped);

    // the restart countdown arms on resume and completes on a later tick
    session.resume(3000);
    assert_eq!(session.status(), RunStatus::Stopped);
    session.tick(4000);
    assert_eq!(session.status(), RunStatus::Stopped);
    session.tick(5000);
    assert_eq!(session.status(), RunStatus::FreeRunning);

    // the clock continues from its frozen value
    assert_eq!(session.elapsed(5000), 2000);
    assert_eq!(session.elapsed(10_000), 7000);
}

#[test]
fn test_gps_loss_samples_keep_sensor_payload() {
    let mut session = RunningSession::new(SessionConfig::default());
    session.start(0);
    session.ingest(sample(1000, 0.0001, 0.), 1000);

    // two fixless samples in a row still deliver their heart rate
    for (ts, bpm) in [(2000u64, 150.), (3000, 152.)] {
        let mut fixless = RawRunData::default();
        fixless.raw.timestamp_ms = Some(ts);
        fixless.raw.heart_rate = Some(bpm);
        session.ingest(fixless, ts);
    }
    assert_eq!(session.telemetries().len(), 3);
    assert_eq!(session.dashboard().heart_rate_bpm, Some(152.));
}

#[test]
fn test_invalid_transitions_are_noops() {
    let mut session = RunningSession::new(SessionConfig::default());

    // resuming a session that was never paused
    assert!(session.resume(1000).is_empty());
    assert_eq!(session.status(), RunStatus::BeforeRunning);

    // pausing before the run started
    assert!(session.pause(1000).is_empty());
    assert_eq!(session.status(), RunStatus::BeforeRunning);

    session.start(0);
    session.pause(5000);
    // double pause
    assert!(session.pause(6000).is_empty());
    assert_eq!(session.status(), RunStatus::Paused);
}

#[test]
fn test_convert_to_free_run_keeps_telemetry() {
    let (mut session, started) = course_session_started(config());
    session.ingest(sample(started + 1000, 0.0005, 0.), started + 1000);
    let recorded = session.telemetries().len();

    session.convert_to_free_run(started + 2000);
    assert_eq!(session.status(), RunStatus::FreeRunning);
    assert_eq!(session.telemetries().len(), recorded);

    // far off the old course no longer stops the session
    session.ingest(sample(started + 3000, 0.0005, 0.01), started + 3000);
    assert_eq!(session.status(), RunStatus::FreeRunning);

    // the record still reports course mode: a course was attached to this run
    let record = session.finalize("converted".to_string(), false, started + 3000);
    assert_eq!(record.mode, ghostrun::session::RunMode::Course);
}

#[test]
fn test_ghost_replay_advances_with_elapsed_time() {
    let mut session = RunningSession::new(SessionConfig::default());

    // ghost ran ~111 m north in 10 s
    let ghost_samples: Vec<RawRunData> = (0..=10)
        .map(|i| sample(i * 1000, 0.0001 * i as f64, 0.))
        .collect();
    let ghost_telemetries = ghostrun::telemetry::normalize(
        &ghost_samples,
        &ghostrun::telemetry::NormalizeOptions::default(),
    );
    session.attach_ghost(&ghost_telemetries);
    session.start(0);

    session.ingest(sample(1, 0., 0.), 1);
    session.tick(5000);

    let ghost_segments: Vec<_> = session
        .segments()
        .into_iter()
        .filter(|s| s.role == SegmentRole::Ghost)
        .collect();
    assert_eq!(ghost_segments.len(), 1);
    let ghost_position = *ghost_segments[0].points.last().expect("ghost advanced");
    // at 5 s elapsed the ghost is halfway up its recorded path
    assert!((ghost_position.lat - 0.0005).abs() < 1e-9);

    // detaching stops future lookups but keeps the emitted segment
    session.detach_ghost();
    session.tick(8000);
    let after_detach: Vec<_> = session
        .segments()
        .into_iter()
        .filter(|s| s.role == SegmentRole::Ghost)
        .collect();
    assert_eq!(after_detach.len(), 1);
    assert_eq!(*after_detach[0].points.last().unwrap(), ghost_position);

    let record = session.finalize("ghost race".to_string(), true, 8000);
    assert_eq!(record.mode, ghostrun::session::RunMode::Ghost);
    assert!(record.is_public);
}

#[test]
fn test_solo_run_record_summary() {
    let mut session = RunningSession::new(SessionConfig::default());
    session.start(0);

    for i in 0..=60u64 {
        let mut s = sample(i * 1000, 0.00002 * i as f64, 0.);
        s.raw.steps = Some(170. / 60. * i as f64);
        s.raw.heart_rate = Some(150.);
        session.ingest(s, i * 1000);
        session.tick(i * 1000);
    }

    let record = session.finalize("morning run".to_string(), false, 60_000);
    assert_eq!(record.mode, ghostrun::session::RunMode::Solo);
    assert_eq!(record.record.duration, 60_000);
    // 60 samples of ~2.22 m each
    assert!((record.record.distance - 133.5).abs() < 3.);
    assert!((record.record.avg_bpm - 150.).abs() < 1e-6);
    assert!((record.record.avg_cadence - 170.).abs() < 5.);
    assert!(record.record.calories > 0.);
    assert!(!record.has_paused);
    assert_eq!(record.telemetries.len(), 61);
}

#[test]
fn test_segment_partition_covers_pause_cycle() {
    let mut session = RunningSession::new(SessionConfig::default());
    session.start(0);

    session.ingest(sample(1000, 0.0001, 0.), 1000);
    session.ingest(sample(2000, 0.0002, 0.), 2000);
    session.pause(2500);
    session.ingest(sample(3000, 0.0003, 0.), 3000);
    session.resume(3500);
    session.ingest(sample(4000, 0.0004, 0.), 4000);

    let own: Vec<_> = session
        .segments()
        .into_iter()
        .filter(|s| s.role == SegmentRole::OwnRun)
        .collect();
    assert_eq!(own.len(), 3);
    assert!(own[0].is_running);
    assert!(!own[1].is_running);
    assert!(own[2].is_running);
    let total_points: usize = own.iter().map(|s| s.points.len()).sum();
    assert_eq!(total_points, session.telemetries().len());
}
