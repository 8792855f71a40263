use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded speed reading from the treadmill data characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub speed_kmh: f64,
}

impl SpeedSample {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    pub fn is_moving(&self) -> bool {
        self.speed_kmh > 0.0
    }
}

/// A workout session derived from the speed stream.
///
/// `end_time` stays `None` while the session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub distance_km: f64,
    pub steps: u32,
    pub duration_seconds: u64,
    #[serde(default)]
    pub synced: bool,
}

impl WorkoutRecord {
    pub fn open(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            distance_km: 0.0,
            steps: 0,
            duration_seconds: 0,
            synced: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Retrying,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Scanning => write!(f, "Searching..."),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Retrying => write!(f, "Retrying..."),
            ConnectionState::Failed => write!(f, "Connection failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    PendingStart,
    Running,
    PendingStop,
}

impl SessionState {
    /// True while a workout record is open.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::PendingStop)
    }
}

/// Immutable view of the engine handed to UI and store collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub session_state: SessionState,
    pub speed_kmh: f64,
    pub target_speed_kmh: Option<f64>,
    pub distance_km: f64,
    pub steps: u32,
    pub elapsed_seconds: u64,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Elapsed time formatted as `HH:MM:SS`.
    pub fn elapsed_display(&self) -> String {
        let hours = self.elapsed_seconds / 3600;
        let minutes = (self.elapsed_seconds % 3600) / 60;
        let seconds = self.elapsed_seconds % 60;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Requests accepted by the session controller's background task.
#[derive(Debug, Clone, PartialEq)]
pub enum TreadmillCommand {
    Connect,
    Disconnect,
    SetSpeed(f64),
    AdjustSpeed(f64),
    StartManual,
    StopManual,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(ConnectionState),
    SessionState(SessionState),
    WorkoutFinished(WorkoutRecord),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
