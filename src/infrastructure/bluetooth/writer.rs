//! Ordered, fire-and-forget writes to the control point.
//!
//! Callers enqueue a [`Command`] and return immediately; a dedicated task
//! performs each write with response, one at a time, so the telemetry path
//! never waits on the radio.

use crate::domain::models::{AppEvent, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::protocol::Command;
use crate::infrastructure::bluetooth::transport::BleLink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub type CommandSender = mpsc::UnboundedSender<Command>;

pub struct CommandWriter {
    tx: CommandSender,
    task: JoinHandle<()>,
}

impl CommandWriter {
    pub fn spawn<L: BleLink>(
        link: L,
        control_point: Uuid,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match link.write(control_point, &command.encode()).await {
                    Ok(()) => debug!("Sent {:?}", command),
                    Err(e) => {
                        // A failed write never tears the link down on its own.
                        warn!("Command {:?} failed: {}", command, e);
                        let _ = event_sender.send(AppEvent::LogMessage(StatusMessage {
                            message: format!("Command {:?} failed: {}", command, e),
                            severity: MessageSeverity::Warning,
                        }));
                    }
                }
            }
        });
        Self { tx, task }
    }

    /// Queue a command; false if the writer is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn sender(&self) -> CommandSender {
        self.tx.clone()
    }
}

impl Drop for CommandWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
