//! Walkpad Treadmill Protocol
//!
//! Control point commands and treadmill data frames of the Bluetooth
//! Fitness Machine Service as used by the walkpad. Pure transforms, no state.

use crate::domain::models::SpeedSample;
use crate::error::{Result, TreadmillError};
use tracing::trace;
use uuid::Uuid;

/// Fitness Machine Service (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001826_0000_1000_8000_00805f9b34fb);

/// Treadmill Data characteristic (0x2ACD) - telemetry notifications
pub const TREADMILL_DATA_UUID: Uuid = Uuid::from_u128(0x00002acd_0000_1000_8000_00805f9b34fb);

/// Fitness Machine Control Point (0x2AD9) - where commands are written
pub const CONTROL_POINT_UUID: Uuid = Uuid::from_u128(0x00002ad9_0000_1000_8000_00805f9b34fb);

/// Walkpad address used when none is configured
pub const DEFAULT_DEVICE_ADDRESS: &str = "69:82:20:D3:DE:C7";

/// Smallest treadmill data frame carrying a speed field
pub const MIN_FRAME_LEN: usize = 4;

/// Control point commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Take control of the machine (sent once after subscribing)
    RequestControl,
    /// Start or resume; also reused as the keep-alive
    Resume,
    /// Stop the belt
    Stop,
    /// Target speed in hundredths of km/h
    SetSpeed(u16),
}

impl Command {
    pub const REQUEST_CONTROL: u8 = 0x00;
    pub const SET_SPEED: u8 = 0x02;
    pub const RESUME: u8 = 0x07;
    pub const STOP: u8 = 0x08;

    /// Command that drives the belt to `speed_kmh`.
    ///
    /// Zero maps to [`Command::Stop`]; `SetSpeed` is never encoded for zero.
    pub fn for_speed(speed_kmh: f64) -> Result<Self> {
        if !speed_kmh.is_finite() || speed_kmh < 0.0 {
            return Err(TreadmillError::InvalidSpeed(speed_kmh));
        }
        let units = (speed_kmh * 100.0).round();
        if units == 0.0 {
            return Ok(Self::Stop);
        }
        if units > u16::MAX as f64 {
            return Err(TreadmillError::InvalidSpeed(speed_kmh));
        }
        Ok(Self::SetSpeed(units as u16))
    }

    /// Wire bytes for the control point (multi-byte fields little-endian).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::RequestControl => vec![Self::REQUEST_CONTROL],
            Self::Resume => vec![Self::RESUME],
            Self::Stop => vec![Self::STOP],
            Self::SetSpeed(units) => {
                let [lo, hi] = units.to_le_bytes();
                vec![Self::SET_SPEED, lo, hi]
            }
        }
    }
}

/// Parse the speed out of a treadmill data notification
///
/// # Frame Structure
///
/// ```text
/// [0-1]   : Flags (ignored)
/// [2-3]   : Instantaneous speed (u16 little-endian, 0.01 km/h)
/// [4-..]  : Optional fields (ignored)
/// ```
pub fn decode_speed(frame: &[u8]) -> Result<SpeedSample> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(TreadmillError::MalformedFrame { len: frame.len() });
    }

    #[cfg(debug_assertions)]
    trace!("Raw frame: {:02X?}", frame);

    let raw = u16::from_le_bytes([frame[2], frame[3]]);
    Ok(SpeedSample::new(raw as f64 / 100.0))
}

/// Build a minimal treadmill data frame (no flags) carrying `speed_kmh`.
pub fn encode_telemetry_frame(speed_kmh: f64) -> Result<[u8; MIN_FRAME_LEN]> {
    if !speed_kmh.is_finite() || speed_kmh < 0.0 {
        return Err(TreadmillError::InvalidSpeed(speed_kmh));
    }
    let units = (speed_kmh * 100.0).round();
    if units > u16::MAX as f64 {
        return Err(TreadmillError::InvalidSpeed(speed_kmh));
    }
    let [lo, hi] = (units as u16).to_le_bytes();
    Ok([0x00, 0x00, lo, hi])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::RequestControl.encode(), vec![0x00]);
        assert_eq!(Command::Resume.encode(), vec![0x07]);
        assert_eq!(Command::Stop.encode(), vec![0x08]);
        assert_eq!(Command::SetSpeed(350).encode(), vec![0x02, 0x5E, 0x01]);
    }

    #[test]
    fn test_zero_speed_is_stop() {
        let cmd = Command::for_speed(0.0).unwrap();
        assert_eq!(cmd, Command::Stop);
        assert_eq!(cmd.encode(), vec![0x08]);
    }

    #[test]
    fn test_speed_units_are_rounded() {
        assert_eq!(Command::for_speed(2.5).unwrap(), Command::SetSpeed(250));
        assert_eq!(Command::for_speed(1.005).unwrap(), Command::SetSpeed(100));
        assert_eq!(Command::for_speed(3.999).unwrap(), Command::SetSpeed(400));
        assert_eq!(Command::for_speed(0.1).unwrap(), Command::SetSpeed(10));
    }

    #[test]
    fn test_invalid_speed() {
        assert!(matches!(
            Command::for_speed(-0.5),
            Err(TreadmillError::InvalidSpeed(_))
        ));
        assert!(matches!(
            Command::for_speed(f64::NAN),
            Err(TreadmillError::InvalidSpeed(_))
        ));
        assert!(matches!(
            Command::for_speed(700.0),
            Err(TreadmillError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn test_short_frame_is_malformed() {
        for len in 0..MIN_FRAME_LEN {
            let frame = vec![0u8; len];
            assert!(matches!(
                decode_speed(&frame),
                Err(TreadmillError::MalformedFrame { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn test_decode_ignores_trailing_fields() {
        let frame = [0x84, 0x04, 0xF4, 0x01, 0x10, 0x27, 0x00, 0xFF];
        let sample = decode_speed(&frame).unwrap();
        assert!((sample.speed_kmh - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_telemetry_round_trip() {
        for units in 0..=30_000u32 {
            let speed = units as f64 / 100.0;
            let frame = encode_telemetry_frame(speed).unwrap();
            let decoded = decode_speed(&frame).unwrap();
            assert!(
                (decoded.speed_kmh - speed).abs() < 1e-9,
                "{speed} decoded as {}",
                decoded.speed_kmh
            );
        }
    }

    #[test]
    fn test_telemetry_frame_range_uses_rounded_units() {
        assert_eq!(encode_telemetry_frame(655.354).unwrap(), [0x00, 0x00, 0xFF, 0xFF]);
        assert!(encode_telemetry_frame(655.36).is_err());
        assert!(encode_telemetry_frame(-0.01).is_err());
    }

    #[test]
    fn test_well_known_uuids() {
        assert_eq!(
            TREADMILL_DATA_UUID.to_string(),
            "00002acd-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CONTROL_POINT_UUID,
            Uuid::parse_str("00002ad9-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }
}
