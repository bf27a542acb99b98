//! Raw line I/O over one chassis socket
//!
//! A [`Connection`] owns either a TCP stream to a real chassis or, in dummy
//! mode, one half of an in-memory duplex stream whose other half is served
//! by a `xena_sim` virtual chassis task.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use xena_protocol::LINE_TERMINATOR;
use xena_sim::{run_virtual_chassis_task, VirtualChassis, VirtualChassisCommand, VirtualChassisConfig};

use crate::config::ConnectionConfig;
use crate::error::TransportError;

/// Bytes requested per socket read
const READ_CHUNK: usize = 4096;

/// Capacity of each direction of the dummy-mode duplex stream
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Open socket, real or simulated
enum Link {
    Tcp(TcpStream),
    Virtual {
        stream: DuplexStream,
        cmd_tx: mpsc::Sender<VirtualChassisCommand>,
        task: JoinHandle<io::Result<()>>,
    },
}

impl Link {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Link::Tcp(stream) => {
                stream.write_all(data).await?;
                stream.flush().await
            }
            Link::Virtual { stream, .. } => {
                stream.write_all(data).await?;
                stream.flush().await
            }
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Link::Tcp(stream) => stream.read(buf).await,
            Link::Virtual { stream, .. } => stream.read(buf).await,
        }
    }

    async fn close(self) {
        match self {
            Link::Tcp(mut stream) => {
                if let Err(e) = stream.shutdown().await {
                    debug!("Socket shutdown failed: {}", e);
                }
            }
            Link::Virtual { stream, cmd_tx, task } => {
                let _ = cmd_tx.try_send(VirtualChassisCommand::Shutdown);
                drop(stream);
                if let Err(e) = task.await {
                    warn!("Virtual chassis task failed: {}", e);
                }
            }
        }
    }
}

/// One socket to one chassis
pub struct Connection {
    config: ConnectionConfig,
    dummy: bool,
    virtual_chassis: VirtualChassisConfig,
    link: Option<Link>,
}

impl Connection {
    /// Create a closed connection
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            dummy: false,
            virtual_chassis: VirtualChassisConfig::default(),
            link: None,
        }
    }

    /// Connection settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Route all I/O to an in-memory virtual chassis; only before `connect`
    pub fn set_dummy_mode(&mut self, enabled: bool) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        self.dummy = enabled;
        Ok(())
    }

    /// Whether dummy mode is enabled
    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    /// Configure the virtual chassis used in dummy mode; only before `connect`
    pub fn set_virtual_chassis(&mut self, config: VirtualChassisConfig) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        self.virtual_chassis = config;
        Ok(())
    }

    /// Whether the socket is open
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Open the socket
    ///
    /// Real connections enable TCP keepalive and disable Nagle. The whole
    /// resolve-and-connect sequence is bounded by the configured timeout.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        if self.dummy {
            let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
            let (cmd_tx, cmd_rx) = mpsc::channel(4);
            let chassis = VirtualChassis::from_config(self.config.host.clone(), &self.virtual_chassis);
            let task = tokio::spawn(run_virtual_chassis_task(server, chassis, cmd_rx));

            info!("Connected to virtual chassis {}", self.config.host);
            self.link = Some(Link::Virtual {
                stream: client,
                cmd_tx,
                task,
            });
            return Ok(());
        }

        let address = self.config.address();
        let stream = match timeout(self.config.timeout(), open_tcp(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { address, source }),
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    address,
                    timeout_ms: self.config.timeout_ms,
                })
            }
        };
        stream.set_nodelay(true)?;

        info!("Connected to chassis {}", address);
        self.link = Some(Link::Tcp(stream));
        Ok(())
    }

    /// Close the socket; does nothing when already closed
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.close().await;
            info!("Disconnected from chassis {}", self.config.host);
        }
    }

    /// Write `text` followed by the line terminator
    pub async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push(LINE_TERMINATOR);

        if let Err(e) = link.write_all(line.as_bytes()).await {
            self.link = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read whatever the chassis has sent, up to one chunk
    ///
    /// The returned text may hold several lines or part of one. End of
    /// stream and read timeout both close the connection: a late reply
    /// would otherwise be taken as the answer to the next query.
    pub async fn read_reply(&mut self) -> Result<String, TransportError> {
        let timeout_ms = self.config.timeout_ms;
        let period = self.config.timeout();
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = [0u8; READ_CHUNK];
        let n = match timeout(period, link.read(&mut buf)).await {
            Ok(Ok(0)) => {
                warn!("Chassis {} closed the connection", self.config.host);
                self.link = None;
                return Err(TransportError::ConnectionClosed);
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                self.link = None;
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    "No reply from chassis {} within {}ms, dropping connection",
                    self.config.host, timeout_ms
                );
                self.link = None;
                return Err(TransportError::ReadTimeout { timeout_ms });
            }
        };

        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }

    /// Timeout applied to connect and to each read
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

/// Resolve `address` and connect to the first reachable candidate
async fn open_tcp(address: &str) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in lookup_host(address).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address found for {address}"))
    }))
}
