//! BLE transport seam.
//!
//! The lifecycle manager talks to hardware only through these traits, so the
//! same connect/retry/teardown logic runs against `btleplug` and against the
//! in-crate mock used by tests.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of the telemetry channel between transport and detector
pub const NOTIFICATION_BUFFER: usize = 64;

/// In-order telemetry payloads; closes when the link drops.
pub type NotificationRx = mpsc::Receiver<Vec<u8>>;

/// Something that can find the treadmill.
#[async_trait]
pub trait BleCentral: Send + Sync + 'static {
    type Link: BleLink;

    /// Scan until `address` shows up or `timeout` elapses
    /// (`DeviceNotFound` in that case).
    async fn find_device(&self, address: &str, timeout: Duration) -> Result<Self::Link>;
}

/// An open (or openable) link to one peripheral.
#[async_trait]
pub trait BleLink: Clone + Send + Sync + 'static {
    async fn connect(&self) -> Result<()>;

    /// Run service discovery and return the advertised service UUIDs.
    async fn discover_services(&self) -> Result<Vec<Uuid>>;

    /// Enable notifications on `characteristic` and forward their payloads.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationRx>;

    /// Write with response; returns once the peer acknowledged.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;
}
