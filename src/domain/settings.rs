use crate::domain::activity::{DetectorConfig, LinkLossPolicy};
use crate::domain::cadence::{AboveRangePolicy, StepCurve};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "walkpad".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Device
    #[serde(default = "default_device_address")]
    pub device_address: String,
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_data_uuid")]
    pub ble_data_char_uuid: String,
    #[serde(default = "default_control_uuid")]
    pub ble_control_char_uuid: String,

    // Connection
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_interval_secs: u64,
    #[serde(default = "default_false")]
    pub auto_reconnect: bool,
    #[serde(default = "default_retry_delay_secs")]
    pub reconnect_delay_secs: u64,

    // Workout detection
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_min_workout_steps")]
    pub min_workout_steps: u32,
    #[serde(default)]
    pub step_curve_above_range: AboveRangePolicy,
    #[serde(default)]
    pub link_loss_policy: LinkLossPolicy,

    // Console controls
    #[serde(default = "default_speed_increment")]
    pub speed_increment_kmh: f64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: default_device_address(),
            ble_service_uuid: default_service_uuid(),
            ble_data_char_uuid: default_data_uuid(),
            ble_control_char_uuid: default_control_uuid(),
            scan_timeout_secs: default_scan_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            max_connect_attempts: default_max_connect_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            keep_alive_interval_secs: default_keep_alive_secs(),
            auto_reconnect: false,
            reconnect_delay_secs: default_retry_delay_secs(),
            debounce_ms: default_debounce_ms(),
            min_workout_steps: default_min_workout_steps(),
            step_curve_above_range: AboveRangePolicy::default(),
            link_loss_policy: LinkLossPolicy::default(),
            speed_increment_kmh: default_speed_increment(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            step_interval: Duration::from_secs(1),
            min_steps: self.min_workout_steps,
            curve: StepCurve::new(self.step_curve_above_range),
            link_loss: self.link_loss_policy,
        }
    }
}

fn default_device_address() -> String {
    "69:82:20:D3:DE:C7".to_string()
}
fn default_service_uuid() -> String {
    "00001826-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_data_uuid() -> String {
    "00002acd-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_control_uuid() -> String {
    "00002ad9-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_scan_timeout_secs() -> u64 {
    20
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_settle_delay_ms() -> u64 {
    3000
}
fn default_max_connect_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_keep_alive_secs() -> u64 {
    10
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_min_workout_steps() -> u32 {
    50
}
fn default_speed_increment() -> f64 {
    0.1
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from `path`, falling back to defaults if it is missing or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("WalkpadController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
