//! Command channel
//!
//! The protocol carries no message lengths and no reply counts, so the
//! channel is the only place that knows where one exchange ends. Every
//! exchange takes the wire lock for its full duration, which keeps the
//! keepalive task and foreground callers from interleaving partial reads.
//!
//! Exchange kinds:
//! - [`CommandChannel::send_command`]: write only
//! - [`CommandChannel::send_query`]: write, read exactly one line
//! - [`CommandChannel::send_query_multiline`]: write, write `SYNC`, read
//!   until the `<SYNC>` sentinel
//! - [`CommandChannel::send_query_verify`]: write, read one line, require `<OK>`

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use xena_protocol::{LineCodec, Reply, KEEPALIVE_COMMAND, REPLY_OK, SYNC_COMMAND};
use xena_sim::VirtualChassisConfig;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{ChannelError, TransportError};

/// Connection plus the bytes read from it but not yet consumed
struct Wire {
    connection: Connection,
    codec: LineCodec,
}

impl Wire {
    /// Next complete line, reading from the socket as needed
    async fn next_line(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(line) = self.codec.next_line() {
                return Ok(line);
            }
            match self.connection.read_reply().await {
                Ok(chunk) => self.codec.push_str(&chunk),
                Err(e) => {
                    self.codec.clear();
                    return Err(e);
                }
            }
        }
    }
}

/// Serialized command/query access to one chassis
pub struct CommandChannel {
    name: String,
    wire: Mutex<Wire>,
}

impl CommandChannel {
    /// Create a channel over a closed connection
    pub fn new(config: ConnectionConfig) -> Self {
        Self::from_connection(Connection::new(config))
    }

    /// Create a channel over an existing connection
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            name: connection.config().host.clone(),
            wire: Mutex::new(Wire {
                connection,
                codec: LineCodec::new(),
            }),
        }
    }

    /// Create a channel that talks to an in-memory virtual chassis
    pub fn dummy(config: ConnectionConfig, chassis: VirtualChassisConfig) -> Result<Self, TransportError> {
        let mut connection = Connection::new(config);
        connection.set_dummy_mode(true)?;
        connection.set_virtual_chassis(chassis)?;
        Ok(Self::from_connection(connection))
    }

    /// Chassis host this channel talks to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open the underlying connection
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().await;
        wire.codec.clear();
        wire.connection.connect().await
    }

    /// Close the underlying connection
    pub async fn disconnect(&self) {
        let mut wire = self.wire.lock().await;
        wire.connection.disconnect().await;
        wire.codec.clear();
    }

    /// Whether the underlying connection is open
    pub async fn is_connected(&self) -> bool {
        self.wire.lock().await.connection.is_connected()
    }

    /// Send a command without waiting for a reply
    pub async fn send_command(&self, cmd: &str) -> Result<(), ChannelError> {
        let mut wire = self.wire.lock().await;
        if !wire.connection.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        debug!("{} send_command({})", self.name, cmd);
        wire.connection.send_line(cmd).await?;
        Ok(())
    }

    /// Send a query and return its single reply line
    ///
    /// Returns an empty string when the channel is not connected.
    pub async fn send_query(&self, cmd: &str) -> Result<String, ChannelError> {
        let mut wire = self.wire.lock().await;
        if !wire.connection.is_connected() {
            warn!("{} send_query({}) on a disconnected channel", self.name, cmd);
            return Ok(String::new());
        }

        wire.connection.send_line(cmd).await?;
        let reply = wire.next_line().await?;
        debug!("{} send_query({}) -> {}", self.name, cmd, reply);
        Ok(reply)
    }

    /// Send a query followed by `SYNC` and collect every reply line before the sentinel
    ///
    /// A rejected query yields an empty vector. The remaining lines of the
    /// burst are still read up to the sentinel so the next exchange starts
    /// on a clean stream. Returns an empty vector when not connected.
    pub async fn send_query_multiline(&self, cmd: &str) -> Result<Vec<String>, ChannelError> {
        let mut wire = self.wire.lock().await;
        if !wire.connection.is_connected() {
            warn!(
                "{} send_query_multiline({}) on a disconnected channel",
                self.name, cmd
            );
            return Ok(Vec::new());
        }

        debug!("{} send_query_multiline({})", self.name, cmd);
        wire.connection.send_line(cmd.trim_end()).await?;
        wire.connection.send_line(SYNC_COMMAND).await?;

        let mut replies = Vec::new();
        let mut rejected = false;
        loop {
            let line = wire.next_line().await?;
            match Reply::classify(&line) {
                Reply::Sync => break,
                Reply::SyntaxError(text) => {
                    if !rejected {
                        warn!("{} multiline query {} rejected: {}", self.name, cmd, text);
                    }
                    rejected = true;
                }
                _ => {
                    trace!("{} multiline reply: {}", self.name, line);
                    if !rejected {
                        replies.push(line);
                    }
                }
            }
        }

        if rejected {
            return Ok(Vec::new());
        }
        Ok(replies)
    }

    /// Send a command and require the success sentinel as its reply
    pub async fn send_query_verify(&self, cmd: &str) -> Result<(), ChannelError> {
        let cmd = cmd.trim();
        let mut wire = self.wire.lock().await;
        if !wire.connection.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        wire.connection.send_line(cmd).await?;
        let reply = wire.next_line().await?;

        if Reply::classify(&reply) != Reply::Ok {
            warn!("{} send_query_verify({}) failed: {}", self.name, cmd, reply);
            return Err(ChannelError::CommandRejected {
                command: cmd.to_string(),
                expected: REPLY_OK.to_string(),
                actual: reply,
            });
        }

        debug!("{} send_query_verify({}) succeeded", self.name, cmd);
        Ok(())
    }

    /// Send one keepalive query
    pub async fn keepalive(&self) -> Result<(), ChannelError> {
        let reply = self.send_query(KEEPALIVE_COMMAND).await?;
        trace!("{} keepalive -> {}", self.name, reply);
        Ok(())
    }
}
