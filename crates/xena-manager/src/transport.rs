//! Transport seam between the object model and the wire
//!
//! The object model never touches sockets. It addresses objects with a
//! [`Target`] (chassis address plus [`Location`]) and calls through
//! [`XenaTransport`]. [`CliTransport`] implements the trait over one
//! [`CommandChannel`] per chassis, with a keepalive task per channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use xena_channel::{ChannelConfig, ChannelError, CommandChannel, ConnectionConfig, KeepAlive, TransportError};
use xena_protocol::value::quote;
use xena_protocol::{Location, ParseError, Reply};
use xena_sim::VirtualChassisConfig;

use crate::error::{XenaError, XenaResult};

/// Where a command goes: chassis address plus location on that chassis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub chassis: String,
    pub location: Location,
}

impl Target {
    pub fn new(chassis: impl Into<String>, location: Location) -> Self {
        Self {
            chassis: chassis.into(),
            location,
        }
    }
}

/// Operations the object model needs from the wire
#[async_trait]
pub trait XenaTransport: Send + Sync {
    /// Connect to a chassis, log on with `password` and claim it for `owner`
    async fn add_chassis(&self, address: &str, port: u16, password: &str, owner: &str) -> XenaResult<()>;

    /// Disconnect one chassis and forget it
    async fn remove_chassis(&self, address: &str) -> XenaResult<()>;

    /// Disconnect every chassis
    async fn disconnect(&self);

    /// Send a command and require the success sentinel
    async fn send_command(&self, target: &Target, command: &str, args: &[&str]) -> XenaResult<()>;

    /// Send a query and return the reply with the echo stripped
    async fn send_command_return(&self, target: &Target, command: &str, args: &[&str]) -> XenaResult<String>;

    /// Send a multi-reply query and return the raw reply lines
    async fn send_command_return_multilines(
        &self,
        target: &Target,
        command: &str,
        args: &[&str],
    ) -> XenaResult<Vec<String>>;

    /// Read one attribute
    async fn get_attribute(&self, target: &Target, attribute: &str) -> XenaResult<String> {
        self.send_command_return(target, attribute, &["?"]).await
    }

    /// Read one attribute through the multi-reply form
    ///
    /// Returns `None` when the device rejects the query, which makes this
    /// the way to ask whether the hardware knows an attribute at all.
    async fn probe_attribute(&self, target: &Target, attribute: &str) -> XenaResult<Option<String>> {
        let lines = self
            .send_command_return_multilines(target, attribute, &["?"])
            .await?;
        Ok(lines.iter().find(|line| !is_status_reply(line)).map(|line| {
            target
                .location
                .extract_value(attribute, line)
                .unwrap_or(line.trim())
                .to_string()
        }))
    }

    /// Write one attribute, verified
    async fn set_attribute(&self, target: &Target, attribute: &str, value: &str) -> XenaResult<()> {
        self.send_command(target, attribute, &[value]).await
    }

    /// Read the bulk info/config snapshot of an object
    ///
    /// Rejected bulk queries contribute nothing.
    async fn get_attributes(&self, target: &Target) -> XenaResult<BTreeMap<String, String>> {
        let mut attributes = BTreeMap::new();
        for command in target.location.kind().info_commands() {
            let lines = self
                .send_command_return_multilines(target, command, &["?"])
                .await?;
            for line in lines {
                if let Some((name, value)) = target.location.split_reply(&line) {
                    attributes.insert(name, value);
                }
            }
        }
        Ok(attributes)
    }
}

/// `<...>` status line, e.g. `<NOTRESERVED>` or `<BADMODULE>`
fn is_status_reply(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('<') && line.ends_with('>')
}

struct ChassisLink {
    channel: Arc<CommandChannel>,
    keepalive: Option<KeepAlive>,
}

/// [`XenaTransport`] over the chassis CLI, one channel per chassis
pub struct CliTransport {
    links: RwLock<HashMap<String, ChassisLink>>,
    /// Template for every chassis; host and port are filled in per chassis
    channel: ChannelConfig,
    virtual_chassis: Option<VirtualChassisConfig>,
}

impl CliTransport {
    /// Create a transport that connects over TCP
    pub fn new(timeout_ms: u64, keepalive_interval: Option<Duration>) -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            channel: ChannelConfig {
                connection: ConnectionConfig {
                    timeout_ms,
                    ..ConnectionConfig::default()
                },
                keepalive_interval_ms: keepalive_interval.map_or(0, |period| period.as_millis() as u64),
            },
            virtual_chassis: None,
        }
    }

    /// Create a transport whose chassis are all in-memory virtual chassis
    pub fn dummy(chassis: VirtualChassisConfig, keepalive_interval: Option<Duration>) -> Self {
        Self {
            virtual_chassis: Some(chassis),
            ..Self::new(xena_channel::config::DEFAULT_TIMEOUT_MS, keepalive_interval)
        }
    }

    /// Whether chassis are simulated
    pub fn is_dummy(&self) -> bool {
        self.virtual_chassis.is_some()
    }

    /// Addresses of connected chassis
    pub async fn chassis(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.links.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    async fn channel(&self, address: &str) -> XenaResult<Arc<CommandChannel>> {
        self.links
            .read()
            .await
            .get(address)
            .map(|link| link.channel.clone())
            .ok_or_else(|| XenaError::UnknownChassis(address.to_string()))
    }

    async fn handshake(channel: &CommandChannel, password: &str, owner: &str) -> XenaResult<()> {
        channel.connect().await?;
        channel
            .send_query_verify(&format!("c_logon {}", quote(password)))
            .await?;
        channel
            .send_query_verify(&format!("c_owner {}", quote(owner)))
            .await?;
        Ok(())
    }

    async fn close(link: ChassisLink) {
        if let Some(keepalive) = link.keepalive {
            keepalive.shutdown().await;
        }
        link.channel.disconnect().await;
    }
}

#[async_trait]
impl XenaTransport for CliTransport {
    async fn add_chassis(&self, address: &str, port: u16, password: &str, owner: &str) -> XenaResult<()> {
        if self.links.read().await.contains_key(address) {
            debug!("Chassis {} already connected", address);
            return Ok(());
        }

        let mut config = self.channel.clone();
        config.connection.host = address.to_string();
        config.connection.port = port;
        let channel = match &self.virtual_chassis {
            Some(chassis) => CommandChannel::dummy(config.connection.clone(), chassis.clone())?,
            None => CommandChannel::new(config.connection.clone()),
        };
        let channel = Arc::new(channel);

        if let Err(e) = Self::handshake(&channel, password, owner).await {
            warn!("Logon to chassis {} failed: {}", address, e);
            channel.disconnect().await;
            return Err(e);
        }

        let keepalive = config
            .keepalive_interval()
            .map(|period| KeepAlive::spawn(channel.clone(), period));

        info!("Chassis {} added for {}", address, owner);
        self.links
            .write()
            .await
            .insert(address.to_string(), ChassisLink { channel, keepalive });
        Ok(())
    }

    async fn remove_chassis(&self, address: &str) -> XenaResult<()> {
        let link = self
            .links
            .write()
            .await
            .remove(address)
            .ok_or_else(|| XenaError::UnknownChassis(address.to_string()))?;
        Self::close(link).await;
        info!("Chassis {} removed", address);
        Ok(())
    }

    async fn disconnect(&self) {
        let links: Vec<(String, ChassisLink)> = self.links.write().await.drain().collect();
        for (address, link) in links {
            Self::close(link).await;
            info!("Chassis {} disconnected", address);
        }
    }

    async fn send_command(&self, target: &Target, command: &str, args: &[&str]) -> XenaResult<()> {
        let channel = self.channel(&target.chassis).await?;
        let line = target.location.build_command(command, args);
        channel.send_query_verify(&line).await?;
        Ok(())
    }

    async fn send_command_return(&self, target: &Target, command: &str, args: &[&str]) -> XenaResult<String> {
        let channel = self.channel(&target.chassis).await?;
        let line = target.location.build_command(command, args);
        let reply = channel.send_query(&line).await?;
        if let Some(value) = target.location.extract_value(command, &reply) {
            return Ok(value.to_string());
        }

        if reply.is_empty() && !channel.is_connected().await {
            return Err(TransportError::NotConnected.into());
        }
        if is_status_reply(&reply) || matches!(Reply::classify(&reply), Reply::SyntaxError(_)) {
            warn!("Query {} rejected: {}", line, reply);
            return Err(ChannelError::CommandRejected {
                command: line,
                expected: command.to_ascii_uppercase(),
                actual: reply.trim().to_string(),
            }
            .into());
        }
        debug!("Reply to {} carries no echo: {}", line, reply);
        Err(ParseError::UnexpectedEcho {
            attribute: command.to_string(),
            reply,
        }
        .into())
    }

    async fn send_command_return_multilines(
        &self,
        target: &Target,
        command: &str,
        args: &[&str],
    ) -> XenaResult<Vec<String>> {
        let channel = self.channel(&target.chassis).await?;
        let line = target.location.build_command(command, args);
        Ok(channel.send_query_multiline(&line).await?)
    }
}
