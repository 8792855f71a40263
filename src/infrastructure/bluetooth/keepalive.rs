//! Keep-alive scheduler.
//!
//! The walkpad drops idle links, so while connected and no workout is active
//! a `Resume` is queued every interval. The peer treats it as a no-op when the
//! belt is already stopped; there is no dedicated keep-alive opcode.

use crate::domain::models::SessionState;
use crate::infrastructure::bluetooth::protocol::Command;
use crate::infrastructure::bluetooth::writer::CommandSender;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, trace};

/// Running keep-alive timer; aborted on drop.
pub struct KeepAlive {
    task: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn(
        commands: CommandSender,
        period: Duration,
        session: watch::Receiver<SessionState>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let state = *session.borrow();
                if state.is_active() {
                    trace!("Keep-alive skipped, workout active");
                    continue;
                }
                debug!("Keep-alive ping");
                if commands.send(Command::Resume).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}
