mod config;
pub(crate) mod dashboard;
pub(crate) mod ghost;
pub(crate) mod record;
pub(crate) mod segments;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub use config::SessionConfig;
pub use dashboard::{DashboardAggregator, DashboardSnapshot};
pub use ghost::{GhostReplay, find_closest, resample};
pub use record::{RunMode, RunRecord, RunSummary};
pub use segments::{Segment, SegmentRole};

use crate::geo::{GeoPoint, haversine_m, nearest_distance_m};
use crate::telemetry::{NormalizeOptions, RawRunData, Telemetry, normalize};

/// Enumerated status of a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Session created, nothing recorded yet
    BeforeRunning,
    /// Course attached and start position synchronized, countdown running
    ReadyCourseRunning,
    /// Actively running against an attached course
    CourseRunning,
    /// Actively running without course constraints
    FreeRunning,
    /// Explicitly paused by the user, elapsed time frozen
    Paused,
    /// Halted: off the course corridor, or externally stopped
    Stopped,
    /// Course tracking abandoned, recording continues as a free run
    CancelCourseRunning,
    /// Course finish condition met, awaiting the user's save/continue choice
    CompleteCourseRunning,
}

impl RunStatus {
    /// Whether telemetry ingested in this status is recorded into the
    /// session buffer.
    fn records_telemetry(&self) -> bool {
        !matches!(self, RunStatus::BeforeRunning | RunStatus::ReadyCourseRunning)
    }

    /// Whether the runner is actively covering distance in this status.
    fn is_active(&self) -> bool {
        matches!(
            self,
            RunStatus::CourseRunning
                | RunStatus::FreeRunning
                | RunStatus::CancelCourseRunning
                | RunStatus::CompleteCourseRunning
        )
    }
}

/// One update emitted by the session engine, broadcast to the rendering and
/// persistence subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SessionUpdate {
    StatusChange(RunStatus),
    Point(Box<Telemetry>),
    Tick {
        elapsed_ms: u64,
        dashboard: DashboardSnapshot,
    },
}

/// Pause-aware elapsed time in milliseconds.
///
/// The anchor is the pause instant while paused, the current wall clock
/// otherwise. Output is clamped non-negative, so clock skew can never make
/// the session clock run backwards past zero.
pub fn elapsed_ms(started_at_ms: Option<u64>, paused_at_ms: Option<u64>, now_ms: u64) -> u64 {
    let Some(started_at) = started_at_ms else {
        return 0;
    };
    paused_at_ms.unwrap_or(now_ms).saturating_sub(started_at)
}

/// The dashboard frozen at the moment the course finish condition was met.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletedCourse {
    pub dashboard: DashboardSnapshot,
    /// Index of the completing record in the telemetry buffer
    pub telemetry_index: usize,
    pub completed_at_ms: u64,
}

/// The session engine: owns the telemetry buffer, the segment partition, the
/// dashboard aggregator and the optional course/ghost attachments, and
/// drives all state transitions from two entry points, `ingest` for device
/// samples and `tick` for the periodic timer.
///
/// All mutation happens on whichever single thread owns the session; readers
/// consume the `SessionUpdate` clones the two entry points return.
pub struct RunningSession {
    config: SessionConfig,
    status: RunStatus,
    started_at_ms: Option<u64>,
    paused_at_ms: Option<u64>,
    telemetries: Vec<Telemetry>,
    own_segments: Vec<Segment>,
    course: Option<Vec<GeoPoint>>,
    course_segment: Option<Segment>,
    course_attached: bool,
    ghost: Option<GhostReplay>,
    ghost_segment: Option<Segment>,
    ghost_attached: bool,
    aggregator: DashboardAggregator,
    completed: Option<CompletedCourse>,
    normalize_options: NormalizeOptions,
    countdown_deadline_ms: Option<u64>,
    resume_deadline_ms: Option<u64>,
    /// Wall clock of the first sample outside the course corridor, cleared
    /// on re-entry
    off_course_since_ms: Option<u64>,
    last_reminder_ms: Option<u64>,
    /// Status to return to when a pause or stop ends
    resume_status: RunStatus,
    has_paused: bool,
}

impl RunningSession {
    pub fn new(config: SessionConfig) -> Self {
        let aggregator = DashboardAggregator::new(
            config.body_weight_kg,
            config.max_sample_jump_m,
            config.elevation_noise_m,
        );
        Self {
            config,
            status: RunStatus::BeforeRunning,
            started_at_ms: None,
            paused_at_ms: None,
            telemetries: Vec::new(),
            own_segments: Vec::new(),
            course: None,
            course_segment: None,
            course_attached: false,
            ghost: None,
            ghost_segment: None,
            ghost_attached: false,
            aggregator,
            completed: None,
            normalize_options: NormalizeOptions::default(),
            countdown_deadline_ms: None,
            resume_deadline_ms: None,
            off_course_since_ms: None,
            last_reminder_ms: None,
            resume_status: RunStatus::FreeRunning,
            has_paused: false,
        }
    }

    /// Attaches the reference course polyline. Valid any time before the
    /// course is completed; already-recorded telemetry is kept.
    pub fn attach_course(&mut self, polyline: Vec<GeoPoint>) {
        if polyline.is_empty() {
            warn!("Ignoring empty course polyline");
            return;
        }
        self.course_segment = Some(Segment {
            points: polyline.clone(),
            is_running: true,
            role: SegmentRole::CourseReference,
        });
        self.course = Some(polyline);
        self.course_attached = true;
    }

    /// Attaches a recorded ghost run, pre-resampled for smooth replay.
    pub fn attach_ghost(&mut self, recorded: &[Telemetry]) {
        self.ghost = Some(GhostReplay::new(recorded, self.config.resample_step_ms));
        self.ghost_attached = true;
        if self.ghost_segment.is_none() {
            self.ghost_segment = Some(Segment::new(true, SegmentRole::Ghost));
        }
    }

    /// Stops future ghost lookups. The already-emitted ghost segment is kept
    /// for rendering history.
    pub fn detach_ghost(&mut self) {
        self.ghost = None;
    }

    /// Starts the session. Without a course this begins free running
    /// immediately; with a course the engine waits in `BeforeRunning` until
    /// the runner's position synchronizes with the course start point.
    pub fn start(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if self.status != RunStatus::BeforeRunning {
            warn!("start ignored in status {:?}", self.status);
            return updates;
        }
        if self.course.is_none() {
            self.started_at_ms = Some(now_ms);
            self.set_status(RunStatus::FreeRunning, &mut updates);
        }
        updates
    }

    /// Feeds one raw device sample into the session.
    pub fn ingest(&mut self, sample: RawRunData, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        let Some(mut telemetry) = normalize(&[sample], &self.normalize_options).pop() else {
            debug!("Dropping sample without usable timestamp");
            return updates;
        };

        if let Some(last) = self.telemetries.last() {
            if telemetry.timestamp_ms < last.timestamp_ms {
                debug!(
                    "Dropping out-of-order sample at {} (buffer at {})",
                    telemetry.timestamp_ms, last.timestamp_ms
                );
                return updates;
            }
            // dedup against the last accepted record, no distance credited;
            // fixless samples are kept, they still carry sensor payload
            if telemetry.has_position()
                && telemetry.latitude == last.latitude
                && telemetry.longitude == last.longitude
            {
                return updates;
            }
            self.rebase_against_buffer(&mut telemetry);
        }

        match self.status {
            RunStatus::BeforeRunning => self.check_start_sync(&telemetry, now_ms, &mut updates),
            RunStatus::ReadyCourseRunning => {} // countdown running, nothing recorded yet
            RunStatus::CourseRunning => {
                self.evaluate_course_position(&telemetry, now_ms, &mut updates);
                self.record_telemetry(telemetry, now_ms, &mut updates);
                // frozen after the completing record is folded in: the final
                // leg is part of the course result
                if self.status == RunStatus::CompleteCourseRunning {
                    self.completed = Some(CompletedCourse {
                        dashboard: self.aggregator.snapshot().clone(),
                        telemetry_index: self.telemetries.len().saturating_sub(1),
                        completed_at_ms: now_ms,
                    });
                }
            }
            RunStatus::Stopped => {
                self.check_course_reentry(&telemetry, now_ms, &mut updates);
                self.record_telemetry(telemetry, now_ms, &mut updates);
            }
            RunStatus::FreeRunning
            | RunStatus::Paused
            | RunStatus::CancelCourseRunning
            | RunStatus::CompleteCourseRunning => {
                self.record_telemetry(telemetry, now_ms, &mut updates);
            }
        }

        updates
    }

    /// Advances all wall-clock policy on the periodic timer: the pre-start
    /// and resume countdowns, the off-course reminder and hard timeout, and
    /// the ghost replay cursor. Always emits a `Tick` update.
    pub fn tick(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        match self.status {
            RunStatus::ReadyCourseRunning => {
                if self.countdown_deadline_ms.is_some_and(|d| now_ms >= d) {
                    self.countdown_deadline_ms = None;
                    self.started_at_ms = Some(now_ms);
                    self.set_status(RunStatus::CourseRunning, &mut updates);
                }
            }
            RunStatus::CourseRunning => {
                // the grace deadline passes on the timer alone when GPS
                // samples stop arriving off-course
                if let Some(since) = self.off_course_since_ms
                    && now_ms.saturating_sub(since) >= self.config.off_course_grace_ms
                {
                    self.enter_off_course_stop(now_ms, &mut updates);
                }
            }
            RunStatus::Paused => {
                if self.resume_deadline_ms.is_some_and(|d| now_ms >= d) {
                    self.resume_deadline_ms = None;
                    self.finish_resume(now_ms, &mut updates);
                }
            }
            RunStatus::Stopped => {
                if self.resume_deadline_ms.is_some_and(|d| now_ms >= d) {
                    self.resume_deadline_ms = None;
                    self.finish_resume(now_ms, &mut updates);
                } else {
                    self.tick_off_course(now_ms, &mut updates);
                }
            }
            _ => {}
        }

        if self.status.is_active()
            && let Some(replay) = &mut self.ghost
        {
            let elapsed = elapsed_ms(self.started_at_ms, self.paused_at_ms, now_ms);
            if let Some(ghost_point) = replay.advance(elapsed) {
                let position = ghost_point.position();
                if let Some(segment) = &mut self.ghost_segment {
                    segment.push_point(position);
                }
            }
        }

        updates.push(SessionUpdate::Tick {
            elapsed_ms: elapsed_ms(self.started_at_ms, self.paused_at_ms, now_ms),
            dashboard: self.aggregator.snapshot().clone(),
        });
        updates
    }

    /// Explicit user pause. Freezes elapsed-time accounting; subsequent
    /// telemetry records carry `is_running = false` until resumed.
    pub fn pause(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if !self.status.is_active() {
            warn!("pause ignored in status {:?}", self.status);
            return updates;
        }
        self.resume_status = self.status;
        self.paused_at_ms = Some(now_ms);
        self.has_paused = true;
        self.set_status(RunStatus::Paused, &mut updates);
        updates
    }

    /// Resumes from a pause or an external stop, after the configured
    /// restart countdown. Resuming a session that is not paused is a no-op.
    pub fn resume(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        let externally_stopped =
            self.status == RunStatus::Stopped && self.off_course_since_ms.is_none();
        if self.status != RunStatus::Paused && !externally_stopped {
            warn!("resume ignored in status {:?}", self.status);
            return updates;
        }
        if self.config.resume_countdown_ms == 0 {
            self.finish_resume(now_ms, &mut updates);
        } else {
            self.resume_deadline_ms = Some(now_ms + self.config.resume_countdown_ms);
        }
        updates
    }

    /// External halt (not off-course). Elapsed time freezes like a pause.
    pub fn stop(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if !self.status.is_active() {
            warn!("stop ignored in status {:?}", self.status);
            return updates;
        }
        self.resume_status = self.status;
        self.paused_at_ms = Some(now_ms);
        self.set_status(RunStatus::Stopped, &mut updates);
        updates
    }

    /// Discards the remaining course constraints and continues as a free
    /// run. Already-recorded telemetry is kept.
    pub fn convert_to_free_run(&mut self, now_ms: u64) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if matches!(self.status, RunStatus::FreeRunning) {
            return updates;
        }
        self.course = None;
        self.off_course_since_ms = None;
        self.last_reminder_ms = None;
        self.countdown_deadline_ms = None;
        if let Some(paused_at) = self.paused_at_ms.take()
            && let Some(started_at) = self.started_at_ms
        {
            // paused wall time is not part of the run
            self.started_at_ms = Some(started_at + now_ms.saturating_sub(paused_at));
        }
        if self.started_at_ms.is_none() {
            self.started_at_ms = Some(now_ms);
        }
        self.set_status(RunStatus::FreeRunning, &mut updates);
        updates
    }

    /// Finalizes the session into a run record for the persistence
    /// collaborator. The session itself is untouched: if the save fails the
    /// caller retries with the same state.
    pub fn finalize(&self, name: String, is_public: bool, now_ms: u64) -> RunRecord {
        let mode = if self.course_attached {
            RunMode::Course
        } else if self.ghost_attached {
            RunMode::Ghost
        } else {
            RunMode::Solo
        };
        let snapshot = self.aggregator.snapshot();
        RunRecord {
            name,
            mode,
            started_at_ms: self.started_at_ms.unwrap_or(0),
            record: RunSummary {
                distance: snapshot.total_distance_m,
                elevation_gain: snapshot.total_elevation_gain_m,
                elevation_loss: snapshot.total_elevation_loss_m,
                duration: elapsed_ms(self.started_at_ms, self.paused_at_ms, now_ms),
                avg_pace: snapshot.average_pace_sec_km,
                calories: snapshot.total_calories_kcal,
                avg_bpm: self.aggregator.average_heart_rate_bpm(),
                avg_cadence: self.aggregator.average_cadence_spm(),
            },
            telemetries: self.telemetries.clone(),
            has_paused: self.has_paused,
            is_public,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        elapsed_ms(self.started_at_ms, self.paused_at_ms, now_ms)
    }

    pub fn dashboard(&self) -> &DashboardSnapshot {
        self.aggregator.snapshot()
    }

    /// The dashboard frozen when the course was completed, if it was.
    pub fn completed_course(&self) -> Option<&CompletedCourse> {
        self.completed.as_ref()
    }

    pub fn telemetries(&self) -> &[Telemetry] {
        &self.telemetries
    }

    /// The full renderable segment list: own run, course reference, ghost.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = self.own_segments.clone();
        segments.extend(self.course_segment.clone());
        segments.extend(self.ghost_segment.clone());
        segments
    }

    fn set_status(&mut self, status: RunStatus, updates: &mut Vec<SessionUpdate>) {
        if self.status != status {
            info!("Session status {:?} -> {:?}", self.status, status);
            self.status = status;
            updates.push(SessionUpdate::StatusChange(status));
        }
    }

    /// Recomputes the distance/pace of a batch-of-one normalized record
    /// against the session buffer tail.
    fn rebase_against_buffer(&self, telemetry: &mut Telemetry) {
        let Some(prev) = self.telemetries.last() else {
            return;
        };
        if !prev.has_position() || !telemetry.has_position() {
            return;
        }
        telemetry.distance_from_prev = haversine_m(prev.position(), telemetry.position());
        let dt_ms = telemetry.timestamp_ms.saturating_sub(prev.timestamp_ms);
        if telemetry.distance_from_prev > 0. && dt_ms > 0 {
            telemetry.pace =
                (dt_ms as f64 / 1000.) / (telemetry.distance_from_prev / 1000.);
        }
    }

    fn record_telemetry(
        &mut self,
        mut telemetry: Telemetry,
        now_ms: u64,
        updates: &mut Vec<SessionUpdate>,
    ) {
        if !self.status.records_telemetry() {
            return;
        }
        telemetry.is_running = self.status.is_active();

        let elapsed = elapsed_ms(self.started_at_ms, self.paused_at_ms, now_ms);
        self.aggregator
            .update(self.telemetries.last(), &telemetry, elapsed);
        segments::append(&mut self.own_segments, &telemetry, SegmentRole::OwnRun);
        self.telemetries.push(telemetry.clone());
        updates.push(SessionUpdate::Point(Box::new(telemetry)));
    }

    /// Pre-start: the countdown begins once the runner stands close enough
    /// to the course's start point.
    fn check_start_sync(
        &mut self,
        telemetry: &Telemetry,
        now_ms: u64,
        updates: &mut Vec<SessionUpdate>,
    ) {
        let Some(course) = &self.course else {
            return;
        };
        let Some(start) = course.first() else {
            return;
        };
        if telemetry.has_position()
            && haversine_m(telemetry.position(), *start) < self.config.start_sync_threshold_m
        {
            self.countdown_deadline_ms = Some(now_ms + self.config.countdown_ms);
            self.set_status(RunStatus::ReadyCourseRunning, updates);
        }
    }

    /// While course running: completion first, then the off-course corridor.
    fn evaluate_course_position(
        &mut self,
        telemetry: &Telemetry,
        now_ms: u64,
        updates: &mut Vec<SessionUpdate>,
    ) {
        let Some(course) = &self.course else {
            return;
        };
        if !telemetry.has_position() {
            return;
        }
        let terminal = course.last().copied();
        let distance = nearest_distance_m(course, telemetry.position());

        if let Some(terminal) = terminal
            && haversine_m(telemetry.position(), terminal) < self.config.course_complete_threshold_m
        {
            self.off_course_since_ms = None;
            self.set_status(RunStatus::CompleteCourseRunning, updates);
            return;
        }

        if !distance.is_finite() {
            // cannot evaluate, assume on-course
            return;
        }
        if distance > self.config.off_course_threshold_m {
            let since = *self.off_course_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= self.config.off_course_grace_ms {
                self.enter_off_course_stop(now_ms, updates);
            }
        } else {
            self.off_course_since_ms = None;
        }
    }

    /// Grace window exhausted: halt the session, keeping the re-entry path
    /// back to course running open.
    fn enter_off_course_stop(&mut self, now_ms: u64, updates: &mut Vec<SessionUpdate>) {
        self.resume_status = RunStatus::CourseRunning;
        self.paused_at_ms = Some(now_ms);
        self.last_reminder_ms = Some(now_ms);
        self.set_status(RunStatus::Stopped, updates);
    }

    /// While stopped off-course: a sample back inside the corridor resumes
    /// course running within the grace window.
    fn check_course_reentry(
        &mut self,
        telemetry: &Telemetry,
        now_ms: u64,
        updates: &mut Vec<SessionUpdate>,
    ) {
        let Some(course) = &self.course else {
            return;
        };
        if self.off_course_since_ms.is_none() || !telemetry.has_position() {
            return;
        }
        let distance = nearest_distance_m(course, telemetry.position());
        if distance <= self.config.off_course_threshold_m {
            self.off_course_since_ms = None;
            self.last_reminder_ms = None;
            self.finish_resume(now_ms, updates);
        }
    }

    /// Off-course policy while stopped: a repeating reminder of the
    /// remaining grace time, then the hard timeout that abandons course
    /// tracking. Both are wall-clock deltas recomputed every tick, so a
    /// suspended host cannot lose a one-shot timer.
    fn tick_off_course(&mut self, now_ms: u64, updates: &mut Vec<SessionUpdate>) {
        let Some(since) = self.off_course_since_ms else {
            return;
        };
        let off_course_for = now_ms.saturating_sub(since);
        if off_course_for >= self.config.off_course_cancel_timeout_ms {
            info!("Off course past the hard timeout, abandoning course tracking");
            self.course = None;
            self.off_course_since_ms = None;
            self.last_reminder_ms = None;
            if let Some(paused_at) = self.paused_at_ms.take()
                && let Some(started_at) = self.started_at_ms
            {
                self.started_at_ms = Some(started_at + now_ms.saturating_sub(paused_at));
            }
            self.set_status(RunStatus::CancelCourseRunning, updates);
            return;
        }
        let last = self.last_reminder_ms.unwrap_or(since);
        if now_ms.saturating_sub(last) >= self.config.off_course_reminder_interval_ms {
            let remaining_s =
                (self.config.off_course_cancel_timeout_ms - off_course_for) / 1000;
            info!("Off course: return to the course within {remaining_s}s to keep the run scored");
            self.last_reminder_ms = Some(now_ms);
        }
    }

    /// Ends a pause or stop: the paused wall time is pushed into
    /// `started_at` so the session clock continues from its frozen value.
    fn finish_resume(&mut self, now_ms: u64, updates: &mut Vec<SessionUpdate>) {
        if let Some(paused_at) = self.paused_at_ms.take()
            && let Some(started_at) = self.started_at_ms
        {
            self.started_at_ms = Some(started_at + now_ms.saturating_sub(paused_at));
        }
        self.set_status(self.resume_status, updates);
    }
}
