//! Activity Detector
//!
//! Turns the treadmill's speed stream into discrete workout sessions.
//!
//! ```text
//!            v>0                 v>0 for >= debounce
//!   Idle ──────────► PendingStart ───────────────────► Running
//!    ▲                    │ v==0                         │  ▲
//!    │◄───────────────────┘                        v==0  │  │ v>0
//!    │                                                   ▼  │
//!    └──────────────────────────────────────────── PendingStop
//!           v==0 for >= debounce (finalize record)
//! ```
//!
//! All methods take the current wall-clock time explicitly so the detector
//! never touches a clock or does I/O itself.

use crate::domain::cadence::StepCurve;
use crate::domain::models::{SessionState, SpeedSample, WorkoutRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What to do with an open session when the link goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkLossPolicy {
    /// Drop the open session without emitting a record.
    #[default]
    Discard,
    /// Finalize the open session at the moment of the drop.
    Finalize,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Dwell time before a start or stop is accepted
    pub debounce: std::time::Duration,
    /// Minimum spacing between step accruals
    pub step_interval: std::time::Duration,
    /// Sessions below this step count are discarded
    pub min_steps: u32,
    pub curve: StepCurve,
    pub link_loss: LinkLossPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce: std::time::Duration::from_secs(2),
            step_interval: std::time::Duration::from_secs(1),
            min_steps: 50,
            curve: StepCurve::default(),
            link_loss: LinkLossPolicy::default(),
        }
    }
}

/// Outcome of a transition that opened or closed a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started(DateTime<Utc>),
    /// Finalized with enough steps; goes to the store.
    Finished(WorkoutRecord),
    /// Finalized below the noise floor; dropped.
    Discarded(WorkoutRecord),
}

#[derive(Debug)]
struct OpenWorkout {
    record: WorkoutRecord,
    steps: f64,
    last_step_update: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ActivityDetector {
    config: DetectorConfig,
    debounce: Duration,
    step_interval: Duration,
    state: SessionState,
    pending_since: Option<DateTime<Utc>>,
    current_speed: f64,
    workout: Option<OpenWorkout>,
}

impl ActivityDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let debounce = Duration::from_std(config.debounce).unwrap_or_else(|_| Duration::seconds(2));
        let step_interval = Duration::from_std(config.step_interval)
            .unwrap_or_else(|_| Duration::seconds(1))
            .max(Duration::milliseconds(10));
        Self {
            config,
            debounce,
            step_interval,
            state: SessionState::Idle,
            pending_since: None,
            current_speed: 0.0,
            workout: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn distance_km(&self) -> f64 {
        self.workout
            .as_ref()
            .map(|w| w.record.distance_km)
            .unwrap_or(0.0)
    }

    /// Step count as displayed (floored).
    pub fn steps(&self) -> u32 {
        self.workout
            .as_ref()
            .map(|w| w.steps.floor() as u32)
            .unwrap_or(0)
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.workout
            .as_ref()
            .map(|w| (now - w.record.start_time).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn open_record(&self) -> Option<&WorkoutRecord> {
        self.workout.as_ref().map(|w| &w.record)
    }

    /// Feed one decoded sample.
    pub fn on_sample(&mut self, sample: SpeedSample, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.current_speed = sample.speed_kmh;
        let moving = sample.is_moving();

        match (self.state, moving) {
            (SessionState::Idle, true) => {
                debug!("Speed above zero, waiting for debounce");
                self.state = SessionState::PendingStart;
                self.pending_since = Some(now);
                None
            }
            (SessionState::Idle, false) => None,
            (SessionState::PendingStart, true) => {
                if self.dwell_elapsed(now) {
                    info!("Workout auto-started");
                    Some(self.open(now))
                } else {
                    None
                }
            }
            (SessionState::PendingStart, false) => {
                debug!("Speed blip ignored");
                self.state = SessionState::Idle;
                self.pending_since = None;
                None
            }
            (SessionState::Running, false) => {
                debug!("Speed reached zero, waiting for debounce");
                self.state = SessionState::PendingStop;
                self.pending_since = Some(now);
                None
            }
            (SessionState::Running, true) => None,
            (SessionState::PendingStop, false) => {
                if self.dwell_elapsed(now) {
                    info!("Workout auto-stopped");
                    self.finalize(now)
                } else {
                    None
                }
            }
            (SessionState::PendingStop, true) => {
                debug!("Speed dip ignored");
                self.resume(now);
                None
            }
        }
    }

    /// Periodic accumulation; a no-op unless `Running`.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.state != SessionState::Running {
            return;
        }
        let speed = self.current_speed;
        let Some(workout) = self.workout.as_mut() else {
            return;
        };

        // Recomputed from wall-clock elapsed time, not integrated.
        let elapsed_ms = (now - workout.record.start_time).num_milliseconds().max(0);
        let elapsed_hours = elapsed_ms as f64 / 3_600_000.0;
        workout.record.distance_km = speed * elapsed_hours;

        if speed > 0.0 {
            // Accruals follow the step grid, so a tick landing a little early or
            // late neither drops nor doubles an interval.
            let due = self.step_interval - self.step_interval / 10;
            while now - workout.last_step_update >= due {
                workout.steps += self.config.curve.steps_per_minute(speed) / 60.0;
                workout.last_step_update = workout.last_step_update + self.step_interval;
            }
        } else {
            workout.last_step_update = now;
        }
        workout.record.steps = workout.steps.floor() as u32;
    }

    /// Force a session open, bypassing debounce.
    pub fn start_manual(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.pending_since = None;
        if self.workout.is_some() {
            self.resume(now);
            return None;
        }
        info!("Workout started manually");
        Some(self.open(now))
    }

    /// Force the session closed, bypassing debounce.
    pub fn stop_manual(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.pending_since = None;
        if self.workout.is_none() {
            self.state = SessionState::Idle;
            return None;
        }
        info!("Workout stopped manually");
        self.finalize(now)
    }

    /// Apply the configured [`LinkLossPolicy`] after the link went away.
    pub fn on_link_lost(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.current_speed = 0.0;
        self.pending_since = None;
        match self.config.link_loss {
            LinkLossPolicy::Finalize => {
                if self.workout.is_some() {
                    self.finalize(now)
                } else {
                    self.state = SessionState::Idle;
                    None
                }
            }
            LinkLossPolicy::Discard => {
                if let Some(workout) = self.workout.take() {
                    info!(
                        "Discarding open workout started at {} after link loss",
                        workout.record.start_time
                    );
                }
                self.state = SessionState::Idle;
                None
            }
        }
    }

    fn dwell_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.pending_since
            .map(|since| now - since >= self.debounce)
            .unwrap_or(false)
    }

    /// Back to `Running` with the open record; the stopped stretch earns no steps.
    fn resume(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Running;
        self.pending_since = None;
        if let Some(workout) = self.workout.as_mut() {
            workout.last_step_update = now;
        }
    }

    fn open(&mut self, now: DateTime<Utc>) -> SessionEvent {
        self.state = SessionState::Running;
        self.pending_since = None;
        self.workout = Some(OpenWorkout {
            record: WorkoutRecord::open(now),
            steps: 0.0,
            last_step_update: now,
        });
        SessionEvent::Started(now)
    }

    fn finalize(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        self.state = SessionState::Idle;
        self.pending_since = None;
        let mut workout = self.workout.take()?;

        let record = &mut workout.record;
        record.end_time = Some(now);
        record.duration_seconds = (now - record.start_time).num_seconds().max(0) as u64;
        record.steps = workout.steps.floor() as u32;

        if record.steps >= self.config.min_steps {
            info!(
                "Workout finished: {:.2} km, {} steps, {}s",
                record.distance_km, record.steps, record.duration_seconds
            );
            Some(SessionEvent::Finished(workout.record))
        } else {
            info!(
                "Workout discarded: {} steps below minimum of {}",
                record.steps, self.config.min_steps
            );
            Some(SessionEvent::Discarded(workout.record))
        }
    }
}
