//! Bluetooth Module
//!
//! Provides BLE communication with the walkpad over the Fitness Machine Service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ConnectionManager                      │
//! │  (lifecycle: scan, connect, handshake, retry, teardown)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┬──────────────┐
//!         │             │              │              │
//!         ▼             ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌─────────────┐ ┌──────────┐
//! │ BleCentral │ │  BleLink   │ │CommandWriter│ │KeepAlive │
//! │            │ │            │ │             │ │          │
//! │ - scanner  │ │ - btleplug │ │ - ordered   │ │ - Resume │
//! │ - mock     │ │ - mock     │ │   writes    │ │   when   │
//! │            │ │            │ │             │ │   idle   │
//! └────────────┘ └────────────┘ └─────────────┘ └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - FTMS identifiers, control point commands and telemetry parsing
//! - [`transport`] - `BleCentral`/`BleLink` traits the lifecycle is written against
//! - [`scanner`] - `btleplug` device discovery
//! - [`link`] - `btleplug` link implementation
//! - [`writer`] - Serialized control point writes
//! - [`keepalive`] - Idle keep-alive timer
//! - [`connection`] - Connection lifecycle manager

pub mod connection;
pub mod keepalive;
pub mod link;
#[cfg(test)]
pub mod mock;
pub mod protocol;
pub mod scanner;
pub mod transport;
pub mod writer;

pub use connection::{ConnectionConfig, ConnectionManager};
pub use scanner::BleScanner;
