//! BLE Connection Module
//!
//! Owns the link lifecycle: find the walkpad, connect, verify FTMS, subscribe
//! to telemetry and take control. Retries a bounded number of times and tears
//! everything down cleanly on disconnect or link loss.

use crate::domain::models::{AppEvent, ConnectionState, MessageSeverity, SessionState, StatusMessage};
use crate::domain::settings::Settings;
use crate::error::{Result, TreadmillError};
use crate::infrastructure::bluetooth::keepalive::KeepAlive;
use crate::infrastructure::bluetooth::protocol::{
    self, Command, CONTROL_POINT_UUID, FTMS_SERVICE_UUID, TREADMILL_DATA_UUID,
};
use crate::infrastructure::bluetooth::transport::{BleCentral, BleLink, NotificationRx};
use crate::infrastructure::bluetooth::writer::CommandWriter;
use anyhow::Context;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound for the best-effort Stop and the link close during teardown
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device address to look for
    pub address: String,
    /// Service that must be present after discovery
    pub service_uuid: Uuid,
    /// Telemetry characteristic
    pub data_char_uuid: Uuid,
    /// Control point characteristic
    pub control_char_uuid: Uuid,
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    /// Pause after connecting before discovery; the walkpad is not ready sooner
    pub settle_delay: Duration,
    /// Attempts per `connect()` call
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub keep_alive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: protocol::DEFAULT_DEVICE_ADDRESS.to_string(),
            service_uuid: FTMS_SERVICE_UUID,
            data_char_uuid: TREADMILL_DATA_UUID,
            control_char_uuid: CONTROL_POINT_UUID,
            scan_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn from_settings(s: &Settings) -> anyhow::Result<Self> {
        let parse = |value: &str, what: &str| {
            Uuid::parse_str(value).with_context(|| format!("Invalid {} UUID: {}", what, value))
        };
        Ok(Self {
            address: s.device_address.clone(),
            service_uuid: parse(&s.ble_service_uuid, "service")?,
            data_char_uuid: parse(&s.ble_data_char_uuid, "data characteristic")?,
            control_char_uuid: parse(&s.ble_control_char_uuid, "control point")?,
            scan_timeout: Duration::from_secs(s.scan_timeout_secs),
            connect_timeout: Duration::from_secs(s.connect_timeout_secs),
            settle_delay: Duration::from_millis(s.settle_delay_ms),
            max_attempts: s.max_connect_attempts.max(1),
            retry_delay: Duration::from_secs(s.retry_delay_secs),
            keep_alive_interval: Duration::from_secs(s.keep_alive_interval_secs.max(1)),
        })
    }
}

/// Connection lifecycle for one treadmill
pub struct ConnectionManager<C: BleCentral> {
    central: C,
    config: ConnectionConfig,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    session: watch::Receiver<SessionState>,
    link: Option<C::Link>,
    writer: Option<CommandWriter>,
    keep_alive: Option<KeepAlive>,
}

impl<C: BleCentral> ConnectionManager<C> {
    /// `session` feeds the keep-alive so it stays quiet during workouts.
    pub fn new(
        central: C,
        config: ConnectionConfig,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        session: watch::Receiver<SessionState>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            central,
            config,
            state: ConnectionState::Disconnected,
            state_tx,
            event_sender,
            session,
            link: None,
            writer: None,
            keep_alive: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Follow state changes, including the intermediate ones of a running `connect()`.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connect with retries and return the telemetry stream.
    ///
    /// Dropping the returned future mid-attempt is allowed; call
    /// [`disconnect`](Self::disconnect) afterwards to release the link.
    pub async fn connect(&mut self) -> Result<NotificationRx> {
        if self.link.is_some() {
            debug!("Connect requested with a link open, tearing it down first");
            self.teardown().await;
        }

        let max_attempts = self.config.max_attempts.max(1);
        info!("Connecting to treadmill {}", self.config.address);
        self.send_log("Connecting to treadmill...", MessageSeverity::Info);

        let mut attempt = 1;
        loop {
            match self.attempt(attempt, max_attempts).await {
                Ok(rx) => {
                    info!("Treadmill connected on attempt {}", attempt);
                    self.send_log("Treadmill connected", MessageSeverity::Success);
                    return Ok(rx);
                }
                Err(e) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                    self.teardown().await;

                    if attempt >= max_attempts {
                        error!("Giving up after {} attempt(s): {}", attempt, e);
                        self.set_state(ConnectionState::Failed);
                        self.send_log(
                            &format!("Connection failed: {}", e),
                            MessageSeverity::Error,
                        );
                        return Err(TreadmillError::ConnectionFailed {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }

                    self.set_state(ConnectionState::Retrying);
                    self.send_log(
                        &format!(
                            "Attempt {} failed ({}), retrying in {}s",
                            attempt,
                            e,
                            self.config.retry_delay.as_secs()
                        ),
                        MessageSeverity::Warning,
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&mut self, attempt: u32, max_attempts: u32) -> Result<NotificationRx> {
        // Step 1: Find the device
        self.set_state(ConnectionState::Scanning);
        debug!("Attempt {}/{}: scanning", attempt, max_attempts);
        let link = self
            .central
            .find_device(&self.config.address, self.config.scan_timeout)
            .await?;
        self.link = Some(link.clone());

        // Step 2: Open the link
        self.set_state(ConnectionState::Connecting);
        tokio::time::timeout(self.config.connect_timeout, link.connect())
            .await
            .map_err(|_| TreadmillError::ConnectTimeout(self.config.connect_timeout.as_secs()))??;

        // Step 3: Let the device settle, then check it speaks FTMS
        tokio::time::sleep(self.config.settle_delay).await;
        let services = link.discover_services().await?;
        if !services.contains(&self.config.service_uuid) {
            return Err(TreadmillError::ServiceNotFound(self.config.service_uuid));
        }

        // Step 4: Telemetry first, then take control
        let telemetry = link.subscribe(self.config.data_char_uuid).await?;
        link.write(self.config.control_char_uuid, &Command::RequestControl.encode())
            .await?;

        // Step 5: Background writers
        let writer = CommandWriter::spawn(
            link.clone(),
            self.config.control_char_uuid,
            self.event_sender.clone(),
        );
        self.keep_alive = Some(KeepAlive::spawn(
            writer.sender(),
            self.config.keep_alive_interval,
            self.session.clone(),
        ));
        self.writer = Some(writer);

        self.set_state(ConnectionState::Connected);
        Ok(telemetry)
    }

    /// Queue a control point command; false when not connected.
    pub fn send(&self, command: Command) -> bool {
        match &self.writer {
            Some(writer) if self.is_connected() => writer.send(command),
            _ => {
                debug!("Dropping {:?}, not connected", command);
                false
            }
        }
    }

    /// Stop the belt if possible and close the link. Never fails.
    pub async fn disconnect(&mut self) {
        if self.is_connected() {
            if let Some(link) = self.link.as_ref() {
                let stop_bytes = Command::Stop.encode();
                let stop = async {
                    if !link.is_connected().await {
                        debug!("Link already down, skipping Stop");
                        return Ok(());
                    }
                    link.write(self.config.control_char_uuid, &stop_bytes).await
                };
                match tokio::time::timeout(TEARDOWN_TIMEOUT, stop).await {
                    Ok(Ok(())) => debug!("Stop sent before disconnect"),
                    Ok(Err(e)) => debug!("Stop before disconnect failed: {}", e),
                    Err(_) => debug!("Stop before disconnect timed out"),
                }
            }
        }

        self.teardown().await;
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected from treadmill");
            self.send_log("Disconnected from treadmill", MessageSeverity::Info);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Clean up after the peripheral dropped the link on its own.
    pub async fn link_lost(&mut self) {
        warn!("Connection to treadmill lost");
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        self.send_log("Connection to treadmill lost", MessageSeverity::Warning);
    }

    async fn teardown(&mut self) {
        self.keep_alive = None;
        self.writer = None;
        if let Some(link) = self.link.take() {
            match tokio::time::timeout(TEARDOWN_TIMEOUT, link.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Ignoring error while closing link: {}", e),
                Err(_) => debug!("Closing link timed out"),
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("Connection state: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(state));
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
