//! Scriptable in-memory BLE transport for tests.

use crate::error::{Result, TreadmillError};
use crate::infrastructure::bluetooth::protocol::FTMS_SERVICE_UUID;
use crate::infrastructure::bluetooth::transport::{
    BleCentral, BleLink, NotificationRx, NOTIFICATION_BUFFER,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
struct LinkState {
    connected: bool,
    services: Vec<Uuid>,
    fail_writes: bool,
    hang_connect: bool,
    writes: Vec<Vec<u8>>,
    connects: u32,
    disconnects: u32,
    notify_tx: Option<mpsc::Sender<Vec<u8>>>,
}

#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn new() -> Self {
        let state = LinkState {
            services: vec![FTMS_SERVICE_UUID],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn set_services(&self, services: Vec<Uuid>) {
        self.state.lock().unwrap().services = services;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn hang_connect(&self, hang: bool) {
        self.state.lock().unwrap().hang_connect = hang;
    }

    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().unwrap().disconnects
    }

    /// Push a telemetry payload as if the peripheral notified it.
    pub async fn notify(&self, payload: Vec<u8>) {
        let tx = self.state.lock().unwrap().notify_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(payload).await;
        }
    }

    /// Simulate the peripheral dropping the link.
    pub fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.notify_tx = None;
    }
}

#[async_trait]
impl BleLink for MockLink {
    async fn connect(&self) -> Result<()> {
        let hang = self.state.lock().unwrap().hang_connect;
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        state.connected = true;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<Uuid>> {
        Ok(self.state.lock().unwrap().services.clone())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<NotificationRx> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        self.state.lock().unwrap().notify_tx = Some(tx);
        Ok(rx)
    }

    async fn write(&self, _characteristic: Uuid, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(TreadmillError::WriteFailed("mock write rejected".to_string()));
        }
        state.writes.push(data.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.connected = false;
        state.notify_tx = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

/// Result of one scripted scan.
#[derive(Debug, Clone, Copy)]
pub enum ScanOutcome {
    Found,
    NotFound,
    /// Never completes (until the caller's timeout or cancellation).
    Hang,
}

pub struct MockCentral {
    link: MockLink,
    outcomes: Mutex<VecDeque<ScanOutcome>>,
    scans: AtomicU32,
}

impl MockCentral {
    /// Unscripted scans find the device.
    pub fn new(link: MockLink) -> Self {
        Self {
            link,
            outcomes: Mutex::new(VecDeque::new()),
            scans: AtomicU32::new(0),
        }
    }

    pub fn with_outcomes(link: MockLink, outcomes: impl IntoIterator<Item = ScanOutcome>) -> Self {
        Self {
            link,
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            scans: AtomicU32::new(0),
        }
    }

    pub fn scans(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleCentral for Arc<MockCentral> {
    type Link = MockLink;

    async fn find_device(&self, address: &str, timeout: Duration) -> Result<MockLink> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScanOutcome::Found);
        let not_found = || TreadmillError::DeviceNotFound {
            address: address.to_string(),
            timeout_secs: timeout.as_secs(),
        };
        match outcome {
            ScanOutcome::Found => Ok(self.link.clone()),
            ScanOutcome::NotFound => Err(not_found()),
            ScanOutcome::Hang => {
                tokio::time::sleep(timeout).await;
                Err(not_found())
            }
        }
    }
}
