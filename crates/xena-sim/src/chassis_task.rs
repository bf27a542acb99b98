//! Virtual chassis actor task
//!
//! This module provides a pure async task that owns a VirtualChassis and
//! communicates via an async stream. The task uses a select! loop to:
//! - Read command lines from the connection stream and answer them
//! - Handle shutdown commands from a channel

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use xena_protocol::{LineCodec, LINE_TERMINATOR};

use crate::VirtualChassis;

/// Commands that can be sent to a virtual chassis actor
#[derive(Debug, Clone)]
pub enum VirtualChassisCommand {
    /// Shutdown the virtual chassis actor
    Shutdown,
}

/// Run the virtual chassis actor task
///
/// This task owns the VirtualChassis and processes:
/// 1. Command lines read from the stream (sent by the client connection)
/// 2. Shutdown commands from the command channel
///
/// The task ends when the stream is closed, on shutdown, or when the
/// command channel is dropped.
pub async fn run_virtual_chassis_task<S>(
    mut stream: S,
    mut chassis: VirtualChassis,
    mut cmd_rx: mpsc::Receiver<VirtualChassisCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    info!("Starting virtual chassis task for {}", chassis.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual chassis stream closed for {}", chassis.id());
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);

                        let mut output = String::new();
                        while let Some(line) = codec.next_line() {
                            for reply in chassis.handle_line(&line) {
                                output.push_str(&reply);
                                output.push(LINE_TERMINATOR);
                            }
                        }

                        if !output.is_empty() {
                            if let Err(e) = stream.write_all(output.as_bytes()).await {
                                warn!("Virtual chassis {} write error: {}", chassis.id(), e);
                                return Err(e);
                            }
                            let _ = stream.flush().await;
                        }
                    }
                    Err(e) => {
                        warn!("Virtual chassis {} stream error: {}", chassis.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualChassisCommand::Shutdown) => {
                        info!("Shutdown requested for virtual chassis {}", chassis.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual chassis {}", chassis.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual chassis task ended for {}", chassis.id());
    Ok(())
}
