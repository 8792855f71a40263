//! BLE Scanner Module
//!
//! Finds the walkpad by its fixed address using the first local adapter.

use crate::error::{Result, TreadmillError};
use crate::infrastructure::bluetooth::link::BtleplugLink;
use crate::infrastructure::bluetooth::transport::BleCentral;
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tracing::{debug, info};

/// Poll interval while waiting for the device to be reported
const SCAN_POLL_MS: u64 = 250;

/// BLE scanner backed by `btleplug`
pub struct BleScanner {
    adapter: Adapter,
}

impl BleScanner {
    /// Bind to the first Bluetooth adapter on the system
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TreadmillError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(name) => info!("Using Bluetooth adapter: {}", name),
            Err(e) => debug!("Could not read adapter info: {}", e),
        }

        Ok(Self { adapter })
    }

    async fn wait_for(&self, address: &str) -> Result<Peripheral> {
        loop {
            for peripheral in self.adapter.peripherals().await? {
                if matches_address(&peripheral, address) {
                    return Ok(peripheral);
                }
            }
            tokio::time::sleep(Duration::from_millis(SCAN_POLL_MS)).await;
        }
    }
}

#[async_trait]
impl BleCentral for BleScanner {
    type Link = BtleplugLink;

    async fn find_device(&self, address: &str, timeout: Duration) -> Result<BtleplugLink> {
        info!("Scanning for {} ({}s timeout)", address, timeout.as_secs());
        self.adapter.start_scan(ScanFilter::default()).await?;

        let found = tokio::time::timeout(timeout, self.wait_for(address)).await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan cleanly: {}", e);
        }

        match found {
            Ok(Ok(peripheral)) => {
                info!("Found device {}", address);
                Ok(BtleplugLink::new(peripheral))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TreadmillError::DeviceNotFound {
                address: address.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Linux reports the MAC address; macOS only exposes an opaque id, so accept either.
fn matches_address(peripheral: &Peripheral, address: &str) -> bool {
    peripheral.address().to_string().eq_ignore_ascii_case(address)
        || peripheral.id().to_string().eq_ignore_ascii_case(address)
}
