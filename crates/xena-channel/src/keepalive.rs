//! Background keepalive task
//!
//! The chassis drops idle sessions. [`KeepAlive`] periodically sends a no-op
//! query through the same [`CommandChannel`] as foreground callers, so it
//! waits for the wire lock like any other exchange.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::CommandChannel;

/// Commands that can be sent to a keepalive task
#[derive(Debug)]
pub enum KeepAliveCommand {
    /// Stop the task
    Shutdown,
}

/// Handle to a running keepalive task; dropping it stops the task
pub struct KeepAlive {
    cmd_tx: mpsc::Sender<KeepAliveCommand>,
    handle: JoinHandle<()>,
}

impl KeepAlive {
    /// Start sending keepalives on `channel` every `period`
    pub fn spawn(channel: Arc<CommandChannel>, period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_keepalive_task(channel, period, cmd_rx));
        Self { cmd_tx, handle }
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(KeepAliveCommand::Shutdown).await;
        if let Err(e) = (&mut self.handle).await {
            warn!("Keepalive task failed: {}", e);
        }
    }

    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_keepalive_task(
    channel: Arc<CommandChannel>,
    period: Duration,
    mut cmd_rx: mpsc::Receiver<KeepAliveCommand>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    info!("Keepalive started for {} every {:?}", channel.name(), period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !channel.is_connected().await {
                    debug!("Keepalive skipped, {} not connected", channel.name());
                    continue;
                }
                if let Err(e) = channel.keepalive().await {
                    warn!("Keepalive to {} failed: {}", channel.name(), e);
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(KeepAliveCommand::Shutdown) | None => break,
                }
            }
        }
    }

    info!("Keepalive stopped for {}", channel.name());
}
