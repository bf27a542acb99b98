//! Stream operations
//!
//! Streams are configured through [`StreamConfig`]: every field that is set
//! turns into exactly one attribute write, in declaration order. Modifiers
//! hang off a stream in two independent families (standard and extended);
//! extended support is probed once per stream and cached on the node.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use xena_protocol::value::{decode_hex_blob, encode_hex_blob, quote, unquote};
use xena_protocol::{ModifierConfig, ModifierType, ObjectKind, ParseError};

use crate::error::{parse_number, XenaError, XenaResult};
use crate::object::{ModifierHandle, ObjectData, StreamHandle};
use crate::session::Session;

/// Transmit state of a stream (`ps_enable`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Enabled,
    Disabled,
    /// Defined but never scheduled
    Suppressed,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Enabled => "ON",
            StreamState::Disabled => "OFF",
            StreamState::Suppressed => "SUPPRESS",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(StreamState::Enabled),
            "OFF" => Ok(StreamState::Disabled),
            "SUPPRESS" => Ok(StreamState::Suppressed),
            _ => Err(ParseError::InvalidValue {
                attribute: "ps_enable".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Stream settings; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Free-text description (`ps_comment`)
    pub comment: Option<String>,
    /// Test payload id (`ps_tpldid`)
    pub tpld_id: Option<u32>,
    /// Transmit state (`ps_enable`)
    pub state: Option<StreamState>,
    /// Share of port rate in parts per million (`ps_ratefraction`)
    pub rate_fraction: Option<u32>,
    /// Packets to send before stopping, -1 for unlimited (`ps_packetlimit`)
    pub packet_limit: Option<i64>,
}

impl StreamConfig {
    /// Config that only sets the comment
    pub fn named(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Attribute writes this config produces, in order
    pub fn commands(&self) -> Vec<(&'static str, String)> {
        let mut commands = Vec::new();
        if let Some(comment) = &self.comment {
            commands.push(("ps_comment", quote(comment)));
        }
        if let Some(tpld_id) = self.tpld_id {
            commands.push(("ps_tpldid", tpld_id.to_string()));
        }
        if let Some(state) = self.state {
            commands.push(("ps_enable", state.to_string()));
        }
        if let Some(rate_fraction) = self.rate_fraction {
            commands.push(("ps_ratefraction", rate_fraction.to_string()));
        }
        if let Some(packet_limit) = self.packet_limit {
            commands.push(("ps_packetlimit", packet_limit.to_string()));
        }
        commands
    }
}

/// Traffic counters: `bps pps bytes packets`
///
/// Used for one stream (`pt_stream`) and for port totals (`pt_total`,
/// `pr_total`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub bps: u64,
    pub pps: u64,
    pub bytes: u64,
    pub packets: u64,
}

impl StreamStats {
    /// Parse the counters carried by an `attribute` reply
    pub(crate) fn from_reply(attribute: &str, s: &str) -> XenaResult<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [bps, pps, bytes, packets] = fields.as_slice() else {
            return Err(XenaError::Parse(ParseError::FieldCount {
                attribute: attribute.to_string(),
                expected: 4,
                actual: fields.len(),
                reply: s.to_string(),
            }));
        };
        Ok(Self {
            bps: parse_number(attribute, bps)?,
            pps: parse_number(attribute, pps)?,
            bytes: parse_number(attribute, bytes)?,
            packets: parse_number(attribute, packets)?,
        })
    }
}

impl FromStr for StreamStats {
    type Err = XenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_reply("pt_stream", s)
    }
}

/// Stream view borrowed from a [`Session`]
pub struct Stream<'a> {
    session: &'a mut Session,
    handle: StreamHandle,
}

impl<'a> Stream<'a> {
    pub(crate) fn new(session: &'a mut Session, handle: StreamHandle) -> Self {
        Self { session, handle }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    /// Write every field set in `config`
    pub async fn apply(&mut self, config: &StreamConfig) -> XenaResult<()> {
        for (attribute, value) in config.commands() {
            self.session.set_attribute(self.handle, attribute, &value).await?;
        }
        if let Some(tpld_id) = config.tpld_id {
            self.session.tpld_mut().observe(tpld_id);
        }
        Ok(())
    }

    pub async fn set_state(&mut self, state: StreamState) -> XenaResult<()> {
        self.session
            .set_attribute(self.handle, "ps_enable", state.as_str())
            .await
    }

    pub async fn state(&mut self) -> XenaResult<StreamState> {
        let state = self.session.get_attribute(self.handle, "ps_enable").await?;
        Ok(state.parse()?)
    }

    /// Description without the surrounding quotes
    pub async fn comment(&mut self) -> XenaResult<String> {
        let comment = self.session.get_attribute(self.handle, "ps_comment").await?;
        Ok(unquote(&comment).to_string())
    }

    /// TPLD id, `None` when the stream carries no test payload
    pub async fn tpld_id(&mut self) -> XenaResult<Option<u32>> {
        let value = self.session.get_attribute(self.handle, "ps_tpldid").await?;
        let tpld: i64 = parse_number("ps_tpldid", &value)?;
        Ok(u32::try_from(tpld).ok())
    }

    /// Raw packet header bytes
    pub async fn packet_headers(&mut self) -> XenaResult<Vec<u8>> {
        let value = self.session.get_attribute(self.handle, "ps_packetheader").await?;
        Ok(decode_hex_blob(&value)?)
    }

    pub async fn set_packet_headers(&mut self, headers: &[u8]) -> XenaResult<()> {
        self.session
            .set_attribute(self.handle, "ps_packetheader", &encode_hex_blob(headers))
            .await
    }

    /// Current transmit counters
    pub async fn read_stats(&mut self) -> XenaResult<StreamStats> {
        self.session.get_attribute(self.handle, "pt_stream").await?.parse()
    }

    /// Whether the hardware supports extended modifiers
    ///
    /// Probed once with a multi-reply query and cached on the stream.
    pub async fn supports_extended_modifiers(&mut self) -> XenaResult<bool> {
        let id = self.handle.id();
        if let ObjectData::Stream {
            extended_modifiers: Some(supported),
        } = self.session.tree().get(id)?.data()
        {
            return Ok(*supported);
        }

        let target = self.session.target(id)?;
        let supported = self
            .session
            .transport()
            .probe_attribute(&target, ModifierType::Extended.count_command())
            .await?
            .is_some();
        debug!("Stream {} extended modifiers: {}", self.session.reference(id)?, supported);

        self.session.tree_mut().get_mut(id)?.data = ObjectData::Stream {
            extended_modifiers: Some(supported),
        };
        Ok(supported)
    }

    async fn require(&mut self, modifier_type: ModifierType) -> XenaResult<()> {
        if modifier_type == ModifierType::Extended && !self.supports_extended_modifiers().await? {
            return Err(XenaError::Unsupported {
                reference: self.session.reference(self.handle)?.to_string(),
                feature: "extended modifiers".to_string(),
            });
        }
        Ok(())
    }

    /// Modifiers of `modifier_type`, discovered on first use
    ///
    /// A stream without extended modifier support has no extended modifiers.
    pub async fn modifiers(&mut self, modifier_type: ModifierType) -> XenaResult<BTreeMap<u32, ModifierHandle>> {
        if modifier_type == ModifierType::Extended && !self.supports_extended_modifiers().await? {
            return Ok(BTreeMap::new());
        }

        let id = self.handle.id();
        let kind = ObjectKind::Modifier(modifier_type);
        if !self.session.tree().get(id)?.is_discovered(kind) {
            let count = self
                .session
                .get_attribute(id, modifier_type.count_command())
                .await?;
            let count: u32 = parse_number(modifier_type.count_command(), &count)?;
            for index in 0..count {
                let modifier = ModifierHandle(self.session.ensure_child(id, kind, index)?);
                self.session.modifier(modifier).refresh().await?;
            }
            self.session.tree_mut().set_discovered(id, kind, true)?;
        }

        Ok(self
            .session
            .tree()
            .children_of(id, kind)?
            .into_iter()
            .map(|(index, modifier)| (index, ModifierHandle(modifier)))
            .collect())
    }

    /// Append a modifier and configure it
    pub async fn add_modifier(
        &mut self,
        modifier_type: ModifierType,
        config: &ModifierConfig,
    ) -> XenaResult<ModifierHandle> {
        self.require(modifier_type).await?;
        let id = self.handle.id();
        let index = self.modifiers(modifier_type).await?.len() as u32;

        self.session
            .set_attribute(id, modifier_type.count_command(), &(index + 1).to_string())
            .await?;
        let modifier = ModifierHandle(self.session.ensure_child(
            id,
            ObjectKind::Modifier(modifier_type),
            index,
        )?);
        self.session.modifier(modifier).apply(config).await?;
        Ok(modifier)
    }

    /// Remove modifier `index` and renumber the rest densely from zero
    ///
    /// The device has no per-modifier delete, so the survivors are
    /// snapshotted, the count is zeroed and the survivors are re-added in
    /// their original order. Returns the removed modifier's configuration.
    pub async fn remove_modifier(&mut self, modifier_type: ModifierType, index: u32) -> XenaResult<ModifierConfig> {
        self.require(modifier_type).await?;
        let id = self.handle.id();
        let existing = self.modifiers(modifier_type).await?;
        let Some(&removed) = existing.get(&index) else {
            let reference = self.session.reference(id)?;
            return Err(XenaError::ObjectNotFound(format!(
                "{}/{}/{}",
                reference,
                ObjectKind::Modifier(modifier_type).name(),
                index
            )));
        };

        let removed = self.session.modifier(removed).config().await?;
        let mut survivors = Vec::with_capacity(existing.len().saturating_sub(1));
        for (position, modifier) in existing {
            if position != index {
                survivors.push(self.session.modifier(modifier).config().await?);
            }
        }

        self.session
            .set_attribute(id, modifier_type.count_command(), "0")
            .await?;
        self.session
            .tree_mut()
            .remove_children(id, ObjectKind::Modifier(modifier_type))?;

        for config in &survivors {
            self.add_modifier(modifier_type, config).await?;
        }
        Ok(removed)
    }

    /// Configuration of modifier `index`
    pub async fn modifier_config(&mut self, modifier_type: ModifierType, index: u32) -> XenaResult<ModifierConfig> {
        let modifiers = self.modifiers(modifier_type).await?;
        match modifiers.get(&index) {
            Some(modifier) => self.session.modifier(*modifier).config().await,
            None => Err(XenaError::ObjectNotFound(format!(
                "{}/{}/{}",
                self.session.reference(self.handle)?,
                ObjectKind::Modifier(modifier_type).name(),
                index
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_commands_in_order() {
        let config = StreamConfig {
            comment: Some("first stream".to_string()),
            tpld_id: Some(3),
            state: Some(StreamState::Suppressed),
            rate_fraction: None,
            packet_limit: Some(-1),
        };
        assert_eq!(
            config.commands(),
            vec![
                ("ps_comment", "\"first stream\"".to_string()),
                ("ps_tpldid", "3".to_string()),
                ("ps_enable", "SUPPRESS".to_string()),
                ("ps_packetlimit", "-1".to_string()),
            ]
        );
        assert!(StreamConfig::default().commands().is_empty());
    }

    #[test]
    fn test_state_parse() {
        assert_eq!("on".parse::<StreamState>().unwrap(), StreamState::Enabled);
        assert_eq!("OFF".parse::<StreamState>().unwrap(), StreamState::Disabled);
        assert!("maybe".parse::<StreamState>().is_err());
    }

    #[test]
    fn test_stats_parse() {
        let stats: StreamStats = "1000000 1488 64000 1000".parse().unwrap();
        assert_eq!(
            stats,
            StreamStats {
                bps: 1_000_000,
                pps: 1488,
                bytes: 64_000,
                packets: 1000,
            }
        );
        assert!("1 2 3".parse::<StreamStats>().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: StreamConfig = serde_json::from_str(r#"{"comment": "a", "state": "Enabled"}"#).unwrap();
        assert_eq!(config.comment.as_deref(), Some("a"));
        assert_eq!(config.state, Some(StreamState::Enabled));
        assert_eq!(config.tpld_id, None);
    }
}
