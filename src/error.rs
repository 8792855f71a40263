//! Error taxonomy for the treadmill engine.
//!
//! Application edges (settings file, logging, CLI) use `anyhow`; everything
//! that crosses the BLE seam or the codec reports a [`TreadmillError`].

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TreadmillError {
    #[error("device {address} not found within {timeout_secs}s")]
    DeviceNotFound { address: String, timeout_secs: u64 },

    #[error("connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("expected service {0} not present on device")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("malformed telemetry frame ({len} bytes, need at least 4)")]
    MalformedFrame { len: usize },

    #[error("invalid speed: {0} km/h")]
    InvalidSpeed(f64),

    #[error("connection failed after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: Box<TreadmillError>,
    },

    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl TreadmillError {
    /// Underlying cause of a terminal connection failure, or the error itself.
    pub fn root_cause(&self) -> &TreadmillError {
        match self {
            Self::ConnectionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TreadmillError>;
