//! Port operations

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use xena_protocol::value::unquote;
use xena_protocol::ObjectKind;

use crate::error::{parse_number, XenaError, XenaResult};
use crate::object::{PortHandle, StreamHandle};
use crate::session::Session;
use crate::stream::{StreamConfig, StreamState, StreamStats};

const RESERVED_BY_YOU: &str = "RESERVED_BY_YOU";
const RESERVED_BY_OTHER: &str = "RESERVED_BY_OTHER";
const RELEASED: &str = "RELEASED";

/// Period between `p_traffic` polls while waiting for a traffic state
pub(crate) const TRAFFIC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Port transmit and receive totals since the last clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    pub tx: StreamStats,
    pub rx: StreamStats,
}

/// Drop the leading address token of a reply line
pub(crate) fn strip_address(line: &str) -> String {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((_, rest)) => rest.trim_start().to_string(),
        None => line.to_string(),
    }
}

/// Port view borrowed from a [`Session`]
pub struct Port<'a> {
    session: &'a mut Session,
    handle: PortHandle,
}

impl<'a> Port<'a> {
    pub(crate) fn new(session: &'a mut Session, handle: PortHandle) -> Self {
        Self { session, handle }
    }

    pub fn handle(&self) -> PortHandle {
        self.handle
    }

    /// `module/port` address on the chassis
    pub fn address(&self) -> XenaResult<String> {
        Ok(self
            .session
            .tree()
            .expect_kind(self.handle.id(), ObjectKind::Port)?
            .location()
            .to_string())
    }

    /// Reserve the port
    ///
    /// A port held by another user is relinquished first when `force` is
    /// set; otherwise the call fails with [`XenaError::ReservedByOther`].
    pub async fn reserve(&mut self, force: bool) -> XenaResult<()> {
        let id = self.handle.id();
        let status = self.session.get_attribute(id, "p_reservation").await?;
        match status.as_str() {
            RESERVED_BY_YOU => return Ok(()),
            RESERVED_BY_OTHER if !force => {
                let owner = self.session.get_attribute(id, "p_reservedby").await?;
                return Err(XenaError::ReservedByOther {
                    location: self.session.reference(id)?.to_string(),
                    owner: unquote(&owner).to_string(),
                });
            }
            RESERVED_BY_OTHER => {
                warn!("Relinquishing {} from its current owner", self.session.reference(id)?);
                self.session.send_command(id, "p_reservation", &["relinquish"]).await?;
            }
            _ => {}
        }
        self.session.send_command(id, "p_reservation", &["reserve"]).await?;
        info!("Reserved port {}", self.session.reference(id)?);
        Ok(())
    }

    /// Release the port if this session holds it
    pub async fn release(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        let status = self.session.get_attribute(id, "p_reservation").await?;
        if status == RESERVED_BY_YOU {
            self.session.send_command(id, "p_reservation", &["release"]).await?;
            debug!("Released port {}", self.session.reference(id)?);
        }
        Ok(())
    }

    /// Take the port away from whoever holds it
    pub async fn relinquish(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        let status = self.session.get_attribute(id, "p_reservation").await?;
        if status != RELEASED {
            self.session.send_command(id, "p_reservation", &["relinquish"]).await?;
        }
        Ok(())
    }

    /// Reset the port to defaults; its streams are gone afterwards
    pub async fn reset(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        self.session.send_command(id, "p_reset", &[]).await?;
        self.forget_streams()
    }

    fn forget_streams(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        let tree = self.session.tree_mut();
        tree.remove_children(id, ObjectKind::Stream)?;
        tree.set_discovered(id, ObjectKind::Stream, false)
    }

    /// Read port info and config into the cache
    pub async fn inventory(&mut self) -> XenaResult<BTreeMap<String, String>> {
        self.session.get_attributes(self.handle.id()).await
    }

    /// Streams of this port, discovered on first use
    ///
    /// Discovery feeds every TPLD id found on the device to the session's
    /// allocator.
    pub async fn streams(&mut self) -> XenaResult<BTreeMap<u32, StreamHandle>> {
        let id = self.handle.id();
        if !self.session.tree().get(id)?.is_discovered(ObjectKind::Stream) {
            let indices = self.session.get_attribute(id, "ps_indices").await?;
            for token in indices.split_whitespace() {
                let index: u32 = parse_number("ps_indices", token)?;
                let stream = self.session.ensure_child(id, ObjectKind::Stream, index)?;
                let tpld = self.session.get_attribute(stream, "ps_tpldid").await?;
                let tpld: i64 = parse_number("ps_tpldid", &tpld)?;
                if let Ok(tpld) = u32::try_from(tpld) {
                    self.session.tpld_mut().observe(tpld);
                }
            }
            self.session.tree_mut().set_discovered(id, ObjectKind::Stream, true)?;
        }

        Ok(self
            .session
            .tree()
            .children_of(id, ObjectKind::Stream)?
            .into_iter()
            .map(|(index, stream)| (index, StreamHandle(stream)))
            .collect())
    }

    /// Create a stream after the highest existing index and configure it
    ///
    /// Without an explicit TPLD id the session allocator picks one; without
    /// an explicit state the stream is enabled.
    pub async fn add_stream(&mut self, config: StreamConfig) -> XenaResult<StreamHandle> {
        let id = self.handle.id();
        let existing = self.streams().await?;
        let index = existing.keys().next_back().map_or(0, |last| last + 1);

        let stream = self.session.tree_mut().insert_indexed(id, ObjectKind::Stream, index)?;
        if let Err(e) = self.session.send_command(stream, "ps_create", &[]).await {
            self.session.tree_mut().remove(stream)?;
            return Err(e);
        }

        let tpld_id = self.session.tpld_mut().allocate(config.tpld_id);
        let config = StreamConfig {
            tpld_id: Some(tpld_id),
            state: Some(config.state.unwrap_or(StreamState::Enabled)),
            ..config
        };
        let handle = StreamHandle(stream);
        self.session.stream(handle).apply(&config).await?;

        debug!("Added stream {} with TPLD id {}", self.session.reference(stream)?, tpld_id);
        Ok(handle)
    }

    /// Delete stream `index` on the device and drop it from the tree
    pub async fn remove_stream(&mut self, index: u32) -> XenaResult<()> {
        let id = self.handle.id();
        self.streams().await?;
        let Some(stream) = self.session.tree().child(id, ObjectKind::Stream, index) else {
            let reference = self.session.reference(id)?;
            return Err(XenaError::ObjectNotFound(format!("{}/stream/{}", reference, index)));
        };
        self.session.send_command(stream, "ps_delete", &[]).await?;
        self.session.remove_object(stream)
    }

    pub async fn start_traffic(&mut self) -> XenaResult<()> {
        self.session.send_command(self.handle, "p_traffic", &["on"]).await
    }

    pub async fn stop_traffic(&mut self) -> XenaResult<()> {
        self.session.send_command(self.handle, "p_traffic", &["off"]).await
    }

    /// Whether the port is transmitting
    pub async fn is_transmitting(&mut self) -> XenaResult<bool> {
        let state = self.session.get_attribute(self.handle, "p_traffic").await?;
        Ok(state.eq_ignore_ascii_case("ON"))
    }

    /// Poll `p_traffic` until it reads `on`
    ///
    /// Without a timeout this waits for as long as the traffic runs.
    pub async fn wait_for_traffic(&mut self, on: bool, timeout: Option<Duration>) -> XenaResult<()> {
        let started = Instant::now();
        loop {
            if self.is_transmitting().await? == on {
                return Ok(());
            }
            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Err(XenaError::Timeout {
                        reference: self.session.reference(self.handle)?.to_string(),
                        attribute: "p_traffic".to_string(),
                        expected: if on { "ON" } else { "OFF" }.to_string(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
            }
            tokio::time::sleep(TRAFFIC_POLL_INTERVAL).await;
        }
    }

    /// Zero the transmit and receive counters
    pub async fn clear_stats(&mut self) -> XenaResult<()> {
        self.session.send_command(self.handle, "pt_clear", &[]).await?;
        self.session.send_command(self.handle, "pr_clear", &[]).await
    }

    /// Transmit and receive totals
    pub async fn read_stats(&mut self) -> XenaResult<PortStats> {
        let tx = self.session.get_attribute(self.handle, "pt_total").await?;
        let rx = self.session.get_attribute(self.handle, "pr_total").await?;
        Ok(PortStats {
            tx: StreamStats::from_reply("pt_total", &tx)?,
            rx: StreamStats::from_reply("pr_total", &rx)?,
        })
    }

    /// Full port configuration as replayable lines
    pub async fn config_dump(&mut self) -> XenaResult<Vec<String>> {
        let mut lines = vec![format!(";Port: {}", self.address()?)];
        let config = self
            .session
            .send_command_return_multilines(self.handle, "p_fullconfig", &["?"])
            .await?;
        lines.extend(config.iter().map(|line| strip_address(line)));
        Ok(lines)
    }

    /// Write [`config_dump`](Self::config_dump) to `path`
    pub async fn save_config(&mut self, path: &Path) -> XenaResult<()> {
        let lines = self.config_dump().await?;
        tokio::fs::write(path, lines.join("\n") + "\n").await?;
        info!("Saved port {} config to {}", self.address()?, path.display());
        Ok(())
    }

    /// Replay a saved configuration onto this port and rediscover its streams
    ///
    /// Lines starting with `;` are comments. Every other line is sent as a
    /// verified command addressed to this port.
    pub async fn load_config(&mut self, path: &Path) -> XenaResult<()> {
        let text = tokio::fs::read_to_string(path).await?;
        let id = self.handle.id();

        let mut sent = 0;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            self.session.send_command(id, line, &[]).await?;
            sent += 1;
        }

        self.forget_streams()?;
        let streams = self.streams().await?;
        info!(
            "Loaded {} commands from {} into port {}, {} streams",
            sent,
            path.display(),
            self.address()?,
            streams.len()
        );
        Ok(())
    }
}
