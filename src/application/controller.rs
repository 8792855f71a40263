//! Session Controller
//!
//! A single background task owns the connection, the activity detector and
//! every timer. Callers talk to it through a [`TreadmillHandle`] and observe
//! it through snapshots and `AppEvent`s.

use crate::application::handle::TreadmillHandle;
use crate::domain::activity::{ActivityDetector, DetectorConfig, SessionEvent};
use crate::domain::models::{
    AppEvent, ConnectionState, MessageSeverity, SessionSnapshot, SessionState, StatusMessage,
    TreadmillCommand,
};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol::{self, Command};
use crate::infrastructure::bluetooth::transport::{BleCentral, NotificationRx};
use crate::infrastructure::bluetooth::{ConnectionConfig, ConnectionManager};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub connection: ConnectionConfig,
    pub detector: DetectorConfig,
    /// Keep reconnecting after failures and link loss until the user disconnects
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            detector: DetectorConfig::default(),
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            connection: ConnectionConfig::from_settings(settings)?,
            detector: settings.detector_config(),
            auto_reconnect: settings.auto_reconnect,
            reconnect_delay: Duration::from_secs(settings.reconnect_delay_secs),
        })
    }
}

/// Wall-clock time that advances with the runtime's monotonic clock.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

enum Wake {
    Command(Option<TreadmillCommand>),
    Frame(Option<Vec<u8>>),
    Tick,
    Reconnect,
}

pub struct SessionController<C: BleCentral> {
    connection: ConnectionManager<C>,
    detector: ActivityDetector,
    telemetry: Option<NotificationRx>,
    clock: Clock,
    session_tx: watch::Sender<SessionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    target_speed: Option<f64>,
    last_error: Option<String>,
    auto_reconnect: bool,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
    /// The user asked to be connected and has not disconnected since
    wants_connection: bool,
}

impl<C: BleCentral> SessionController<C> {
    /// Start the background task.
    pub fn spawn(
        central: C,
        config: ControllerConfig,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> (TreadmillHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (session_tx, session_rx) = watch::channel(SessionState::Idle);

        let connection =
            ConnectionManager::new(central, config.connection, events.clone(), session_rx);
        let controller = Self {
            connection,
            detector: ActivityDetector::new(config.detector),
            telemetry: None,
            clock: Clock::start(),
            session_tx,
            snapshot_tx,
            event_sender: events,
            target_speed: None,
            last_error: None,
            auto_reconnect: config.auto_reconnect,
            reconnect_delay: config.reconnect_delay,
            reconnect_at: None,
            wants_connection: false,
        };

        let task = tokio::spawn(controller.run(command_rx));
        (TreadmillHandle::new(command_tx, snapshot_rx), task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<TreadmillCommand>) {
        info!("Session controller started");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut replay: VecDeque<TreadmillCommand> = VecDeque::new();

        loop {
            let wake = match replay.pop_front() {
                Some(command) => Wake::Command(Some(command)),
                None => tokio::select! {
                    command = commands.recv() => Wake::Command(command),
                    frame = next_frame(&mut self.telemetry) => Wake::Frame(frame),
                    _ = ticker.tick() => Wake::Tick,
                    _ = sleep_until(self.reconnect_at) => Wake::Reconnect,
                },
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(TreadmillCommand::Shutdown)) => {
                    self.shutdown().await;
                    break;
                }
                Wake::Command(Some(TreadmillCommand::Connect)) => {
                    replay.extend(self.connect(&mut commands, &mut ticker).await);
                }
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Frame(Some(frame)) => self.on_frame(&frame),
                Wake::Frame(None) => self.on_link_lost().await,
                Wake::Tick => self.on_tick(),
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    info!("Reconnecting to treadmill");
                    replay.extend(self.connect(&mut commands, &mut ticker).await);
                }
            }
            self.publish();
        }

        self.publish();
        info!("Session controller stopped");
    }

    /// Run a connect that a `Disconnect` or `Shutdown` can cancel.
    ///
    /// Returns commands that arrived meanwhile, to be handled afterwards.
    async fn connect(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<TreadmillCommand>,
        ticker: &mut Interval,
    ) -> Vec<TreadmillCommand> {
        if self.connection.is_connected() {
            debug!("Already connected");
            return Vec::new();
        }

        self.reconnect_at = None;
        self.wants_connection = true;
        self.last_error = None;

        let mut deferred = Vec::new();
        let mut state_rx = self.connection.subscribe_state();
        let outcome = {
            let connect = self.connection.connect();
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break Ok(result),
                    Ok(()) = state_rx.changed() => {
                        let state = *state_rx.borrow_and_update();
                        self.snapshot_tx.send_replace(build_snapshot(
                            &self.detector,
                            state,
                            self.target_speed,
                            self.last_error.clone(),
                            self.clock.now(),
                        ));
                    }
                    _ = ticker.tick() => {
                        let now = self.clock.now();
                        self.detector.tick(now);
                        let state = *state_rx.borrow();
                        self.snapshot_tx.send_replace(build_snapshot(
                            &self.detector,
                            state,
                            self.target_speed,
                            self.last_error.clone(),
                            now,
                        ));
                    }
                    command = commands.recv() => match command {
                        Some(TreadmillCommand::Disconnect) => break Err(TreadmillCommand::Disconnect),
                        Some(TreadmillCommand::Shutdown) | None => break Err(TreadmillCommand::Shutdown),
                        Some(TreadmillCommand::Connect) => debug!("Connect already in progress"),
                        Some(other) => deferred.push(other),
                    },
                }
            }
        };

        match outcome {
            Ok(Ok(telemetry)) => {
                self.telemetry = Some(telemetry);
                deferred
            }
            Ok(Err(e)) => {
                error!("Connection failed: {}", e);
                self.last_error = Some(e.to_string());
                self.schedule_reconnect();
                deferred
            }
            Err(TreadmillCommand::Disconnect) => {
                info!("Connect cancelled");
                self.wants_connection = false;
                self.connection.disconnect().await;
                deferred
            }
            Err(_) => vec![TreadmillCommand::Shutdown],
        }
    }

    async fn handle_command(&mut self, command: TreadmillCommand) {
        let now = self.clock.now();
        match command {
            TreadmillCommand::SetSpeed(speed_kmh) => self.set_speed(speed_kmh),
            TreadmillCommand::AdjustSpeed(delta) => {
                // The belt lags behind the last command while it ramps
                let base = self.target_speed.unwrap_or(self.detector.current_speed());
                let target = (base + delta).max(0.0);
                self.set_speed(target);
            }
            TreadmillCommand::StartManual => {
                let event = self.detector.start_manual(now);
                self.handle_session_event(event);
                if self.connection.is_connected() {
                    self.connection.send(Command::Resume);
                }
            }
            TreadmillCommand::StopManual => {
                let event = self.detector.stop_manual(now);
                self.handle_session_event(event);
                if self.connection.is_connected() && self.connection.send(Command::Stop) {
                    self.target_speed = None;
                }
            }
            TreadmillCommand::Disconnect => self.disconnect().await,
            TreadmillCommand::Connect | TreadmillCommand::Shutdown => {
                debug!("{:?} handled by the run loop", command)
            }
        }
    }

    fn set_speed(&mut self, speed_kmh: f64) {
        let command = match Command::for_speed(speed_kmh) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected speed request: {}", e);
                self.last_error = Some(e.to_string());
                self.send_log(&e.to_string(), MessageSeverity::Warning);
                return;
            }
        };

        if self.connection.send(command) {
            info!("Target speed {:.2} km/h", speed_kmh);
            self.target_speed = Some(speed_kmh);
        } else {
            self.send_log("Not connected, speed not changed", MessageSeverity::Warning);
        }
    }

    fn on_frame(&mut self, frame: &[u8]) {
        match protocol::decode_speed(frame) {
            Ok(sample) => {
                let event = self.detector.on_sample(sample, self.clock.now());
                self.handle_session_event(event);
            }
            Err(e) => debug!("Dropping telemetry frame: {}", e),
        }
    }

    fn on_tick(&mut self) {
        self.detector.tick(self.clock.now());
    }

    async fn on_link_lost(&mut self) {
        self.telemetry = None;
        self.target_speed = None;
        let event = self.detector.on_link_lost(self.clock.now());
        self.handle_session_event(event);
        self.connection.link_lost().await;
        self.last_error = Some("Connection to treadmill lost".to_string());
        self.schedule_reconnect();
    }

    async fn disconnect(&mut self) {
        self.wants_connection = false;
        self.reconnect_at = None;
        self.telemetry = None;
        self.target_speed = None;
        let event = self.detector.on_link_lost(self.clock.now());
        self.handle_session_event(event);
        self.connection.disconnect().await;
    }

    async fn shutdown(&mut self) {
        info!("Shutting down session controller");
        self.disconnect().await;
    }

    fn schedule_reconnect(&mut self) {
        if self.auto_reconnect && self.wants_connection {
            info!("Reconnecting in {}s", self.reconnect_delay.as_secs());
            self.send_log(
                &format!("Reconnecting in {}s...", self.reconnect_delay.as_secs()),
                MessageSeverity::Info,
            );
            self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
        }
    }

    fn handle_session_event(&mut self, event: Option<SessionEvent>) {
        match event {
            Some(SessionEvent::Started(start)) => {
                info!("Workout started at {}", start);
                self.send_log("Workout started", MessageSeverity::Info);
            }
            Some(SessionEvent::Finished(record)) => {
                self.send_log(
                    &format!(
                        "Workout finished: {:.2} km, {} steps",
                        record.distance_km, record.steps
                    ),
                    MessageSeverity::Success,
                );
                let _ = self.event_sender.send(AppEvent::WorkoutFinished(record));
            }
            Some(SessionEvent::Discarded(record)) => {
                info!("Workout discarded with {} steps", record.steps);
                self.send_log("Workout too short, not saved", MessageSeverity::Info);
            }
            None => {}
        }
    }

    fn publish(&mut self) {
        let session_state = self.detector.state();
        if *self.session_tx.borrow() != session_state {
            self.session_tx.send_replace(session_state);
            let _ = self.event_sender.send(AppEvent::SessionState(session_state));
        }

        let snapshot = build_snapshot(
            &self.detector,
            self.connection.state(),
            self.target_speed,
            self.last_error.clone(),
            self.clock.now(),
        );
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

fn build_snapshot(
    detector: &ActivityDetector,
    connection_state: ConnectionState,
    target_speed_kmh: Option<f64>,
    last_error: Option<String>,
    now: DateTime<Utc>,
) -> SessionSnapshot {
    SessionSnapshot {
        connection_state,
        session_state: detector.state(),
        speed_kmh: detector.current_speed(),
        target_speed_kmh,
        distance_km: detector.distance_km(),
        steps: detector.steps(),
        elapsed_seconds: detector.elapsed_seconds(now),
        last_error,
    }
}

async fn next_frame(telemetry: &mut Option<NotificationRx>) -> Option<Vec<u8>> {
    match telemetry {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::{MockCentral, MockLink, ScanOutcome};
    use crate::infrastructure::bluetooth::protocol::encode_telemetry_frame;
    use std::sync::Arc;

    struct Rig {
        link: MockLink,
        central: Arc<MockCentral>,
        handle: TreadmillHandle,
        task: JoinHandle<()>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    }

    fn rig_with(central: MockCentral, link: MockLink, config: ControllerConfig) -> Rig {
        let central = Arc::new(central);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (handle, task) = SessionController::spawn(central.clone(), config, events_tx);
        Rig {
            link,
            central,
            handle,
            task,
            events,
        }
    }

    fn rig() -> Rig {
        let link = MockLink::new();
        rig_with(
            MockCentral::new(link.clone()),
            link,
            ControllerConfig::default(),
        )
    }

    async fn connected_rig() -> Rig {
        let rig = rig();
        rig.handle.connect();
        settle(Duration::from_secs(4)).await;
        assert_eq!(
            rig.handle.current_snapshot().connection_state,
            ConnectionState::Connected
        );
        rig
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn frame(speed_kmh: f64) -> Vec<u8> {
        encode_telemetry_frame(speed_kmh).unwrap().to_vec()
    }

    fn finished(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<crate::domain::models::WorkoutRecord> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AppEvent::WorkoutFinished(record) = event {
                out.push(record);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_produces_one_workout() {
        let mut rig = connected_rig().await;

        rig.link.notify(frame(3.0)).await;
        settle(Duration::from_secs(3)).await;
        rig.link.notify(frame(3.0)).await;
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Running);

        settle(Duration::from_secs(60)).await;
        let running = rig.handle.current_snapshot();
        assert!(running.steps >= 95, "steps = {}", running.steps);
        assert!(running.distance_km > 0.04);

        rig.link.notify(frame(0.0)).await;
        settle(Duration::from_secs(3)).await;
        rig.link.notify(frame(0.0)).await;
        settle(Duration::from_millis(100)).await;

        let records = finished(&mut rig.events);
        assert_eq!(records.len(), 1);
        assert!(records[0].steps >= 95 && records[0].steps <= 101);
        assert!((records[0].distance_km - 0.05).abs() < 0.005);
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_ignored() {
        let rig = connected_rig().await;

        rig.link.notify(vec![0x00, 0x00]).await;
        settle(Duration::from_millis(100)).await;
        let snapshot = rig.handle.current_snapshot();
        assert_eq!(snapshot.session_state, SessionState::Idle);
        assert_eq!(snapshot.speed_kmh, 0.0);

        rig.link.notify(frame(2.0)).await;
        settle(Duration::from_millis(100)).await;
        let snapshot = rig.handle.current_snapshot();
        assert_eq!(snapshot.session_state, SessionState::PendingStart);
        assert_eq!(snapshot.speed_kmh, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_commands() {
        let rig = connected_rig().await;

        rig.handle.set_speed(3.5);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.link.writes().last(), Some(&vec![0x02, 0x5E, 0x01]));
        assert_eq!(rig.handle.current_snapshot().target_speed_kmh, Some(3.5));

        rig.handle.adjust_speed(0.5);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.link.writes().last(), Some(&vec![0x02, 0x90, 0x01]));
        assert_eq!(rig.handle.current_snapshot().target_speed_kmh, Some(4.0));

        rig.handle.adjust_speed(-5.0);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.link.writes().last(), Some(&vec![Command::STOP]));

        let writes_before = rig.link.writes().len();
        rig.handle.set_speed(-1.0);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.link.writes().len(), writes_before);
        assert!(rig.handle.current_snapshot().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_follows_commanded_speed_not_lagging_belt() {
        let rig = connected_rig().await;

        rig.handle.set_speed(3.0);
        settle(Duration::from_millis(100)).await;
        // Belt still ramping up
        rig.link.notify(frame(1.0)).await;
        settle(Duration::from_millis(100)).await;

        rig.handle.adjust_speed(0.5);
        rig.handle.adjust_speed(0.5);
        settle(Duration::from_millis(100)).await;
        let writes = rig.link.writes();
        assert_eq!(
            writes[writes.len() - 2..],
            [vec![0x02, 0x5E, 0x01], vec![0x02, 0x90, 0x01]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_without_target_uses_reported_speed() {
        let rig = connected_rig().await;

        rig.link.notify(frame(2.0)).await;
        settle(Duration::from_millis(100)).await;
        rig.handle.adjust_speed(0.5);
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.link.writes().last(), Some(&vec![0x02, 0xFA, 0x00]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_keeps_start_dwell() {
        let rig = connected_rig().await;

        rig.link.notify(frame(2.0)).await;
        settle(Duration::from_secs(1)).await;
        rig.link.notify(vec![0x01]).await;
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::PendingStart);

        // 2.1 s after the first moving sample
        settle(Duration::from_secs(1)).await;
        rig.link.notify(frame(2.0)).await;
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_keeps_stop_dwell() {
        let rig = connected_rig().await;

        rig.link.notify(frame(2.0)).await;
        rig.handle.start_manual();
        settle(Duration::from_millis(100)).await;
        rig.link.notify(frame(0.0)).await;
        settle(Duration::from_secs(1)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::PendingStop);

        rig.link.notify(vec![0x00, 0x00, 0x10]).await;
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::PendingStop);

        settle(Duration::from_secs(1)).await;
        rig.link.notify(frame(0.0)).await;
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_keeps_ticking_during_connect() {
        let link = MockLink::new();
        let rig = rig_with(
            MockCentral::with_outcomes(link.clone(), [ScanOutcome::Hang]),
            link,
            ControllerConfig::default(),
        );

        rig.handle.start_manual();
        settle(Duration::from_millis(100)).await;
        rig.handle.connect();
        settle(Duration::from_secs(10)).await;

        let snapshot = rig.handle.current_snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Scanning);
        assert_eq!(snapshot.session_state, SessionState::Running);
        assert!(snapshot.elapsed_seconds >= 9, "elapsed = {}", snapshot.elapsed_seconds);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_override_sends_commands() {
        let mut rig = connected_rig().await;

        rig.handle.start_manual();
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Running);
        assert_eq!(rig.link.writes().last(), Some(&vec![Command::RESUME]));

        rig.handle.stop_manual();
        settle(Duration::from_millis(100)).await;
        assert_eq!(rig.handle.current_snapshot().session_state, SessionState::Idle);
        assert_eq!(rig.link.writes().last(), Some(&vec![Command::STOP]));

        // Too short to pass the noise floor
        assert!(finished(&mut rig.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_connect() {
        let link = MockLink::new();
        let rig = rig_with(
            MockCentral::with_outcomes(link.clone(), [ScanOutcome::Hang]),
            link,
            ControllerConfig::default(),
        );

        rig.handle.connect();
        settle(Duration::from_secs(1)).await;
        assert_eq!(
            rig.handle.current_snapshot().connection_state,
            ConnectionState::Scanning
        );

        rig.handle.set_speed(2.0);
        rig.handle.disconnect();
        settle(Duration::from_secs(1)).await;
        assert_eq!(
            rig.handle.current_snapshot().connection_state,
            ConnectionState::Disconnected
        );

        settle(Duration::from_secs(60)).await;
        assert_eq!(rig.central.scans(), 1);
        assert!(rig.link.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_reported_in_snapshot() {
        let link = MockLink::new();
        let rig = rig_with(
            MockCentral::with_outcomes(link.clone(), [ScanOutcome::NotFound; 3]),
            link,
            ControllerConfig::default(),
        );

        rig.handle.connect();
        settle(Duration::from_secs(30)).await;

        let snapshot = rig.handle.current_snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Failed);
        assert!(snapshot.last_error.unwrap().contains("3 attempt"));
        assert_eq!(rig.central.scans(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_discards_open_workout() {
        let mut rig = connected_rig().await;

        rig.handle.start_manual();
        settle(Duration::from_secs(120)).await;
        rig.link.drop_link();
        settle(Duration::from_millis(100)).await;

        let snapshot = rig.handle.current_snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.session_state, SessionState::Idle);
        assert!(snapshot.last_error.is_some());
        assert!(finished(&mut rig.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_after_link_loss() {
        let link = MockLink::new();
        let config = ControllerConfig {
            auto_reconnect: true,
            ..Default::default()
        };
        let rig = rig_with(MockCentral::new(link.clone()), link, config);

        rig.handle.connect();
        settle(Duration::from_secs(4)).await;
        rig.link.drop_link();
        settle(Duration::from_secs(10)).await;

        assert_eq!(rig.central.scans(), 2);
        assert_eq!(
            rig.handle.current_snapshot().connection_state,
            ConnectionState::Connected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_belt_and_task() {
        let rig = connected_rig().await;

        rig.handle.shutdown();
        rig.task.await.unwrap();

        assert_eq!(rig.link.writes().last(), Some(&vec![Command::STOP]));
        assert_eq!(
            rig.handle.current_snapshot().connection_state,
            ConnectionState::Disconnected
        );
    }
}
