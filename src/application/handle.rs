use crate::domain::models::{SessionSnapshot, TreadmillCommand};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Cheap, cloneable front end of a running [`SessionController`](super::SessionController).
///
/// Every request is fire-and-forget; outcomes show up in snapshots and
/// `AppEvent`s.
#[derive(Clone)]
pub struct TreadmillHandle {
    commands: mpsc::UnboundedSender<TreadmillCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl TreadmillHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<TreadmillCommand>,
        snapshots: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    pub fn connect(&self) {
        self.send(TreadmillCommand::Connect);
    }

    pub fn disconnect(&self) {
        self.send(TreadmillCommand::Disconnect);
    }

    pub fn set_speed(&self, speed_kmh: f64) {
        self.send(TreadmillCommand::SetSpeed(speed_kmh));
    }

    /// Change speed relative to the last reported belt speed.
    pub fn adjust_speed(&self, delta_kmh: f64) {
        self.send(TreadmillCommand::AdjustSpeed(delta_kmh));
    }

    pub fn start_manual(&self) {
        self.send(TreadmillCommand::StartManual);
    }

    pub fn stop_manual(&self) {
        self.send(TreadmillCommand::StopManual);
    }

    /// Disconnect and stop the background task.
    pub fn shutdown(&self) {
        self.send(TreadmillCommand::Shutdown);
    }

    pub fn current_snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    fn send(&self, command: TreadmillCommand) {
        if self.commands.send(command).is_err() {
            debug!("Session controller has stopped, request ignored");
        }
    }
}
