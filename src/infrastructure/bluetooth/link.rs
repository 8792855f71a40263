//! BLE link to the walkpad backed by `btleplug`.

use crate::error::{Result, TreadmillError};
use crate::infrastructure::bluetooth::transport::{BleLink, NotificationRx, NOTIFICATION_BUFFER};
use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Some backends keep the notification stream open after a drop; poll the link too.
const LINK_PROBE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TreadmillError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn connect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<Uuid>> {
        self.peripheral.discover_services().await?;
        let services: Vec<Uuid> = self.peripheral.services().iter().map(|s| s.uuid).collect();
        debug!("Discovered {} services", services.len());
        Ok(services)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationRx> {
        let target = self.characteristic(characteristic)?;
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&target).await?;
        info!("Subscribed to {}", characteristic);

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let peripheral = self.peripheral.clone();
        tokio::spawn(async move {
            let mut probe = tokio::time::interval(LINK_PROBE_INTERVAL);
            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(n) if n.uuid == characteristic => {
                            trace!("Notification: {:02X?}", n.value);
                            if tx.send(n.value).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                    _ = probe.tick() => {
                        if !peripheral.is_connected().await.unwrap_or(false) {
                            debug!("Link probe reports peripheral disconnected");
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            debug!("Notification forwarder stopped");
        });

        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        self.peripheral
            .write(&target, data, WriteType::WithResponse)
            .await
            .map_err(|e| TreadmillError::WriteFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}
