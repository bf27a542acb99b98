//! Virtual port and stream state

use std::collections::BTreeMap;

use xena_protocol::value::quote;
use xena_protocol::{Location, ModifierConfig, ModifierType, ObjectKind, REPLY_OK};

use crate::request::Request;
use crate::{
    REPLY_BAD_INDEX, REPLY_BAD_VALUE, REPLY_NOT_RESERVED, REPLY_RESERVED_BY_OTHER,
    REPLY_SYNTAX_ERROR,
};

/// Read-only attributes reported by `P_INFO`
const PORT_INFO_KEYS: &[&str] = &["P_INTERFACE", "P_SPEED", "P_STATUS"];

/// Header installed on a freshly created stream (Ethernet II, IPv4 ethertype)
const DEFAULT_PACKET_HEADER: &str = "0x00000000000004F4BC0000000800";

/// Packets accounted to a running stream per statistics poll
const PACKETS_PER_POLL: u64 = 1000;

/// Rates reported while traffic runs
const TX_BPS: u64 = 1_000_000;
const TX_PPS: u64 = 1488;

/// Bytes accounted per simulated packet
const PACKET_SIZE: u64 = 64;

/// Reservation state as reported to `owner`
pub(crate) fn reservation_status(reserved_by: Option<&str>, owner: &str) -> &'static str {
    match reserved_by {
        None => "RELEASED",
        Some(o) if o == owner => "RESERVED_BY_YOU",
        Some(_) => "RESERVED_BY_OTHER",
    }
}

/// Apply a `reserve`/`release`/`relinquish` action for `owner`
pub(crate) fn apply_reservation(
    reserved_by: &mut Option<String>,
    owner: &str,
    action: &str,
) -> &'static str {
    match action.trim().to_ascii_uppercase().as_str() {
        "RESERVE" => match reserved_by.as_deref() {
            Some(o) if o != owner => REPLY_RESERVED_BY_OTHER,
            _ => {
                *reserved_by = Some(owner.to_string());
                REPLY_OK
            }
        },
        "RELEASE" => {
            if reserved_by.as_deref() == Some(owner) {
                *reserved_by = None;
                REPLY_OK
            } else {
                REPLY_NOT_RESERVED
            }
        }
        "RELINQUISH" => {
            *reserved_by = None;
            REPLY_OK
        }
        _ => REPLY_BAD_VALUE,
    }
}

/// Store or report a free-form attribute
pub(crate) fn generic_attribute(
    location: &Location,
    attributes: &mut BTreeMap<String, String>,
    req: &Request<'_>,
) -> Vec<String> {
    if req.is_query() {
        match attributes.get(&req.command) {
            Some(value) => vec![location.echo(&req.command, value)],
            None => vec![REPLY_SYNTAX_ERROR.to_string()],
        }
    } else if req.args.is_empty() {
        vec![REPLY_SYNTAX_ERROR.to_string()]
    } else {
        attributes.insert(req.command.clone(), req.args.to_string());
        vec![REPLY_OK.to_string()]
    }
}

fn one(reply: &str) -> Vec<String> {
    vec![reply.to_string()]
}

/// Per-call context for port commands
pub(crate) struct PortContext<'a> {
    pub(crate) location: Location,
    pub(crate) owner: &'a str,
    pub(crate) extended_modifiers: bool,
}

#[derive(Debug, Clone)]
struct VirtualModifier {
    fields: String,
    range: String,
}

impl Default for VirtualModifier {
    fn default() -> Self {
        let config = ModifierConfig::default();
        Self {
            fields: config.encode_fields(),
            range: config.encode_range().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct VirtualStream {
    attributes: BTreeMap<String, String>,
    modifiers: Vec<VirtualModifier>,
    ext_modifiers: Vec<VirtualModifier>,
    tx_packets: u64,
}

impl VirtualStream {
    fn is_enabled(&self) -> bool {
        self.attributes
            .get("PS_ENABLE")
            .is_some_and(|state| state.eq_ignore_ascii_case("ON"))
    }

    /// Packet limit, if the stream sends a bounded burst
    fn packet_limit(&self) -> Option<u64> {
        self.attributes
            .get("PS_PACKETLIMIT")
            .and_then(|limit| limit.parse::<i64>().ok())
            .and_then(|limit| u64::try_from(limit).ok())
    }

    fn new() -> Self {
        let attributes = [
            ("PS_COMMENT", quote("")),
            ("PS_TPLDID", "-1".to_string()),
            ("PS_ENABLE", "OFF".to_string()),
            ("PS_RATEFRACTION", "1000000".to_string()),
            ("PS_PACKETLIMIT", "-1".to_string()),
            ("PS_PACKETHEADER", DEFAULT_PACKET_HEADER.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            attributes,
            modifiers: Vec::new(),
            ext_modifiers: Vec::new(),
            tx_packets: 0,
        }
    }

    fn modifiers_mut(&mut self, modifier_type: ModifierType) -> &mut Vec<VirtualModifier> {
        match modifier_type {
            ModifierType::Standard => &mut self.modifiers,
            ModifierType::Extended => &mut self.ext_modifiers,
        }
    }

    fn modifiers(&self, modifier_type: ModifierType) -> &[VirtualModifier] {
        match modifier_type {
            ModifierType::Standard => &self.modifiers,
            ModifierType::Extended => &self.ext_modifiers,
        }
    }

    /// Attribute and modifier lines, in the order they must be replayed
    fn config_lines(&self, location: &Location, extended: bool) -> Vec<String> {
        let mut lines: Vec<String> = self
            .attributes
            .iter()
            .map(|(k, v)| location.echo(k, v))
            .collect();

        let mut types = vec![ModifierType::Standard];
        if extended {
            types.push(ModifierType::Extended);
        }
        for modifier_type in types {
            let modifiers = self.modifiers(modifier_type);
            lines.push(location.echo(modifier_type.count_command(), &modifiers.len().to_string()));
            for (k, modifier) in modifiers.iter().enumerate() {
                let modifier_location = location.child(ObjectKind::Modifier(modifier_type), k as u32);
                lines.push(modifier_location.echo(modifier_type.command(), &modifier.fields));
                lines.push(modifier_location.echo(modifier_type.range_command(), &modifier.range));
            }
        }
        lines
    }
}

/// Modifier command family a stream command belongs to
fn modifier_command(command: &str) -> Option<(ModifierType, ModifierCommand)> {
    match command {
        "PS_MODIFIERCOUNT" => Some((ModifierType::Standard, ModifierCommand::Count)),
        "PS_MODIFIER" => Some((ModifierType::Standard, ModifierCommand::Fields)),
        "PS_MODIFIERRANGE" => Some((ModifierType::Standard, ModifierCommand::Range)),
        "PS_MODIFIEREXTCOUNT" => Some((ModifierType::Extended, ModifierCommand::Count)),
        "PS_MODIFIEREXT" => Some((ModifierType::Extended, ModifierCommand::Fields)),
        "PS_MODIFIEREXTRANGE" => Some((ModifierType::Extended, ModifierCommand::Range)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModifierCommand {
    Count,
    Fields,
    Range,
}

/// One simulated port
#[derive(Debug, Clone)]
pub(crate) struct VirtualPort {
    pub(crate) reserved_by: Option<String>,
    traffic: bool,
    /// `P_TRAFFIC` queries answered since traffic was started
    traffic_polls: u32,
    attributes: BTreeMap<String, String>,
    streams: BTreeMap<u32, VirtualStream>,
}

impl VirtualPort {
    pub(crate) fn new(reserved_by: Option<String>, speed: u32) -> Self {
        let mut port = Self {
            reserved_by,
            traffic: false,
            traffic_polls: 0,
            attributes: BTreeMap::new(),
            streams: BTreeMap::new(),
        };
        port.load_defaults(speed);
        port
    }

    fn load_defaults(&mut self, speed: u32) {
        self.attributes = [
            ("P_INTERFACE", quote("VIRTUAL")),
            ("P_SPEED", speed.to_string()),
            ("P_STATUS", "1.0".to_string()),
            ("P_COMMENT", quote("")),
            ("P_SPEEDSELECTION", "AUTO".to_string()),
            ("P_TXMODE", "NORMAL".to_string()),
            ("P_MACADDRESS", "0x04F4BC000000".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    }

    pub(crate) fn is_reserved_by(&self, owner: &str) -> bool {
        self.reserved_by.as_deref() == Some(owner)
    }

    pub(crate) fn set_traffic(&mut self, on: bool) {
        self.traffic = on;
        self.traffic_polls = 0;
    }

    /// Traffic state as seen by a `P_TRAFFIC` query
    ///
    /// When every enabled stream has a packet limit the burst completes on
    /// the second poll after start: the streams reach their limits and
    /// traffic turns off.
    fn poll_traffic(&mut self) -> bool {
        if !self.traffic {
            return false;
        }
        self.traffic_polls += 1;

        let mut enabled = self.streams.values().filter(|s| s.is_enabled()).peekable();
        let bounded = enabled.peek().is_some() && enabled.all(|s| s.packet_limit().is_some());
        if bounded && self.traffic_polls > 1 {
            for stream in self.streams.values_mut().filter(|s| s.is_enabled()) {
                if let Some(limit) = stream.packet_limit() {
                    stream.tx_packets = stream.tx_packets.max(limit);
                }
            }
            self.set_traffic(false);
        }
        self.traffic
    }

    fn tx_total(&self) -> String {
        let packets: u64 = self.streams.values().map(|s| s.tx_packets).sum();
        let (bps, pps) = if self.traffic { (TX_BPS, TX_PPS) } else { (0, 0) };
        format!("{} {} {} {}", bps, pps, packets * PACKET_SIZE, packets)
    }

    /// Port-wide counters: `PT_TOTAL`, `PR_TOTAL`, `PT_CLEAR`, `PR_CLEAR`
    ///
    /// No receive path is simulated, so receive totals stay at zero.
    fn handle_totals(&mut self, ctx: &PortContext<'_>, req: &Request<'_>, reserved: bool) -> Vec<String> {
        let command = req.command.as_str();
        match command {
            "PT_TOTAL" if req.is_query() => vec![ctx.location.echo(command, &self.tx_total())],
            "PR_TOTAL" if req.is_query() => vec![ctx.location.echo(command, "0 0 0 0")],
            "PT_CLEAR" | "PR_CLEAR" if !req.is_query() => {
                if !reserved {
                    return one(REPLY_NOT_RESERVED);
                }
                if command == "PT_CLEAR" {
                    for stream in self.streams.values_mut() {
                        stream.tx_packets = 0;
                    }
                }
                one(REPLY_OK)
            }
            _ => one(REPLY_SYNTAX_ERROR),
        }
    }

    fn reset(&mut self) {
        let speed = self
            .attributes
            .get("P_SPEED")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        self.set_traffic(false);
        self.streams.clear();
        self.load_defaults(speed);
    }

    /// Replayable port configuration, one echo line per attribute
    fn full_config(&self, ctx: &PortContext<'_>) -> Vec<String> {
        let mut lines: Vec<String> = self
            .attributes
            .iter()
            .filter(|(k, _)| !PORT_INFO_KEYS.contains(&k.as_str()))
            .map(|(k, v)| ctx.location.echo(k, v))
            .collect();

        let indices: Vec<String> = self.streams.keys().map(|i| i.to_string()).collect();
        lines.push(ctx.location.echo("PS_INDICES", &indices.join(" ")));

        for (index, stream) in &self.streams {
            let stream_location = ctx.location.child(ObjectKind::Stream, *index);
            lines.extend(stream.config_lines(&stream_location, ctx.extended_modifiers));
        }
        lines
    }

    pub(crate) fn handle(&mut self, ctx: &PortContext<'_>, req: &Request<'_>) -> Vec<String> {
        let reserved = self.is_reserved_by(ctx.owner);
        let command = req.command.as_str();

        if matches!(command, "PT_TOTAL" | "PR_TOTAL" | "PT_CLEAR" | "PR_CLEAR") {
            return self.handle_totals(ctx, req, reserved);
        }
        if command.starts_with("PS_") || command.starts_with("PT_") {
            return self.handle_stream(ctx, req, reserved);
        }

        match command {
            "P_RESERVATION" => {
                if req.is_query() {
                    let status = reservation_status(self.reserved_by.as_deref(), ctx.owner);
                    vec![ctx.location.echo(command, status)]
                } else {
                    one(apply_reservation(&mut self.reserved_by, ctx.owner, req.args))
                }
            }
            "P_RESERVEDBY" if req.is_query() => {
                let owner = self.reserved_by.clone().unwrap_or_default();
                vec![ctx.location.echo(command, &quote(&owner))]
            }
            "P_RESET" => {
                if !reserved {
                    return one(REPLY_NOT_RESERVED);
                }
                self.reset();
                one(REPLY_OK)
            }
            "P_INFO" if req.is_query() => PORT_INFO_KEYS
                .iter()
                .filter_map(|k| self.attributes.get(*k).map(|v| ctx.location.echo(k, v)))
                .collect(),
            "P_CONFIG" if req.is_query() => self
                .attributes
                .iter()
                .filter(|(k, _)| !PORT_INFO_KEYS.contains(&k.as_str()))
                .map(|(k, v)| ctx.location.echo(k, v))
                .collect(),
            "P_RECEIVESYNC" if req.is_query() => vec![ctx.location.echo(command, "IN_SYNC")],
            "P_TRAFFIC" => {
                if req.is_query() {
                    let state = if self.poll_traffic() { "ON" } else { "OFF" };
                    return vec![ctx.location.echo(command, state)];
                }
                if !reserved {
                    return one(REPLY_NOT_RESERVED);
                }
                match req.args.to_ascii_uppercase().as_str() {
                    "ON" => self.set_traffic(true),
                    "OFF" => self.set_traffic(false),
                    _ => return one(REPLY_BAD_VALUE),
                }
                one(REPLY_OK)
            }
            "P_FULLCONFIG" if req.is_query() => self.full_config(ctx),
            _ if !command.starts_with("P_") => one(REPLY_SYNTAX_ERROR),
            _ if req.is_query() => generic_attribute(&ctx.location, &mut self.attributes, req),
            _ if PORT_INFO_KEYS.contains(&command) => one(REPLY_BAD_VALUE),
            _ if !reserved => one(REPLY_NOT_RESERVED),
            _ => generic_attribute(&ctx.location, &mut self.attributes, req),
        }
    }

    fn handle_stream(
        &mut self,
        ctx: &PortContext<'_>,
        req: &Request<'_>,
        reserved: bool,
    ) -> Vec<String> {
        let command = req.command.as_str();

        if command == "PS_INDICES" {
            if req.is_query() {
                let indices: Vec<String> = self.streams.keys().map(|i| i.to_string()).collect();
                return vec![ctx.location.echo(command, &indices.join(" "))];
            }
            if !reserved {
                return one(REPLY_NOT_RESERVED);
            }
            return one(self.set_indices(req.args));
        }

        let Some(&stream_index) = req.sub.first() else {
            return one(REPLY_SYNTAX_ERROR);
        };
        let stream_location = ctx.location.child(ObjectKind::Stream, stream_index);

        match command {
            "PS_CREATE" => {
                if !reserved {
                    return one(REPLY_NOT_RESERVED);
                }
                if self.streams.contains_key(&stream_index) {
                    return one(REPLY_BAD_INDEX);
                }
                self.streams.insert(stream_index, VirtualStream::new());
                return one(REPLY_OK);
            }
            "PS_DELETE" => {
                if !reserved {
                    return one(REPLY_NOT_RESERVED);
                }
                return match self.streams.remove(&stream_index) {
                    Some(_) => one(REPLY_OK),
                    None => one(REPLY_BAD_INDEX),
                };
            }
            _ => {}
        }

        if matches!(modifier_command(command), Some((ModifierType::Extended, _))) && !ctx.extended_modifiers {
            return one(REPLY_SYNTAX_ERROR);
        }

        let traffic = self.traffic;
        let Some(stream) = self.streams.get_mut(&stream_index) else {
            return one(REPLY_BAD_INDEX);
        };

        if command == "PT_STREAM" {
            if !req.is_query() {
                return one(REPLY_SYNTAX_ERROR);
            }
            let (bps, pps) = if traffic {
                stream.tx_packets += PACKETS_PER_POLL;
                (TX_BPS, TX_PPS)
            } else {
                (0, 0)
            };
            let value = format!(
                "{} {} {} {}",
                bps,
                pps,
                stream.tx_packets * PACKET_SIZE,
                stream.tx_packets
            );
            return vec![stream_location.echo(command, &value)];
        }

        if command == "PS_CONFIG" {
            if !req.is_query() {
                return one(REPLY_SYNTAX_ERROR);
            }
            return stream.config_lines(&stream_location, ctx.extended_modifiers);
        }

        if let Some((modifier_type, kind)) = modifier_command(command) {
            return handle_modifier(stream, &stream_location, req, reserved, modifier_type, kind);
        }

        if !command.starts_with("PS_") {
            return one(REPLY_SYNTAX_ERROR);
        }
        if req.is_query() {
            return generic_attribute(&stream_location, &mut stream.attributes, req);
        }
        if !reserved {
            return one(REPLY_NOT_RESERVED);
        }
        if !valid_stream_value(command, req.args) {
            return one(REPLY_BAD_VALUE);
        }
        generic_attribute(&stream_location, &mut stream.attributes, req)
    }

    /// Make the stream set exactly the listed indices
    fn set_indices(&mut self, args: &str) -> &'static str {
        let mut wanted = Vec::new();
        for token in args.split_whitespace() {
            match token.parse::<u32>() {
                Ok(index) => wanted.push(index),
                Err(_) => return REPLY_BAD_VALUE,
            }
        }
        self.streams.retain(|index, _| wanted.contains(index));
        for index in wanted {
            self.streams.entry(index).or_insert_with(VirtualStream::new);
        }
        REPLY_OK
    }
}

fn handle_modifier(
    stream: &mut VirtualStream,
    stream_location: &Location,
    req: &Request<'_>,
    reserved: bool,
    modifier_type: ModifierType,
    kind: ModifierCommand,
) -> Vec<String> {
    let command = req.command.as_str();

    if kind == ModifierCommand::Count {
        if req.is_query() {
            let count = stream.modifiers(modifier_type).len();
            return vec![stream_location.echo(command, &count.to_string())];
        }
        if !reserved {
            return one(REPLY_NOT_RESERVED);
        }
        let Ok(count) = req.args.parse::<usize>() else {
            return one(REPLY_BAD_VALUE);
        };
        stream
            .modifiers_mut(modifier_type)
            .resize_with(count, VirtualModifier::default);
        return one(REPLY_OK);
    }

    let Some(&modifier_index) = req.sub.get(1) else {
        return one(REPLY_SYNTAX_ERROR);
    };
    let modifier_location =
        stream_location.child(ObjectKind::Modifier(modifier_type), modifier_index);
    let Some(modifier) = stream
        .modifiers_mut(modifier_type)
        .get_mut(modifier_index as usize)
    else {
        return one(REPLY_BAD_INDEX);
    };

    let slot = match kind {
        ModifierCommand::Fields => &mut modifier.fields,
        _ => &mut modifier.range,
    };

    if req.is_query() {
        return vec![modifier_location.echo(command, slot)];
    }
    if !reserved {
        return one(REPLY_NOT_RESERVED);
    }

    let valid = match kind {
        ModifierCommand::Fields => ModifierConfig::decode(req.args, None).is_ok(),
        _ => {
            let parts: Vec<&str> = req.args.split_whitespace().collect();
            parts.len() == 3 && parts.iter().all(|p| p.parse::<u32>().is_ok())
        }
    };
    if !valid {
        return one(REPLY_BAD_VALUE);
    }

    *slot = req.args.split_whitespace().collect::<Vec<_>>().join(" ");
    one(REPLY_OK)
}

fn valid_stream_value(command: &str, args: &str) -> bool {
    match command {
        "PS_ENABLE" => matches!(args.to_ascii_uppercase().as_str(), "ON" | "OFF" | "SUPPRESS"),
        "PS_TPLDID" | "PS_PACKETLIMIT" => args.parse::<i64>().is_ok(),
        "PS_RATEFRACTION" => args.parse::<u32>().is_ok(),
        "PS_PACKETHEADER" => xena_protocol::value::decode_hex_blob(args).is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "tester";

    fn ctx(extended: bool) -> PortContext<'static> {
        PortContext {
            location: Location::new(ObjectKind::Port, vec![0, 0]),
            owner: OWNER,
            extended_modifiers: extended,
        }
    }

    fn send(port: &mut VirtualPort, ctx: &PortContext<'_>, line: &str) -> Vec<String> {
        let req = Request::parse(line).unwrap();
        port.handle(ctx, &req)
    }

    #[test]
    fn test_reservation_cycle() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(None, 1000);

        assert_eq!(send(&mut port, &ctx, "0/0 p_reservation ?"), vec!["0/0 P_RESERVATION RELEASED"]);
        assert_eq!(send(&mut port, &ctx, "0/0 p_reservation reserve"), vec![REPLY_OK]);
        assert_eq!(
            send(&mut port, &ctx, "0/0 p_reservation ?"),
            vec!["0/0 P_RESERVATION RESERVED_BY_YOU"]
        );
        assert_eq!(send(&mut port, &ctx, "0/0 p_reservation release"), vec![REPLY_OK]);
        assert_eq!(
            send(&mut port, &ctx, "0/0 p_reservation release"),
            vec![REPLY_NOT_RESERVED]
        );
    }

    #[test]
    fn test_reserved_by_other() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some("someone".to_string()), 1000);

        assert_eq!(
            send(&mut port, &ctx, "0/0 p_reservation ?"),
            vec!["0/0 P_RESERVATION RESERVED_BY_OTHER"]
        );
        assert_eq!(
            send(&mut port, &ctx, "0/0 p_reservation reserve"),
            vec![REPLY_RESERVED_BY_OTHER]
        );
        assert_eq!(send(&mut port, &ctx, "0/0 p_reservation relinquish"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 p_reservation reserve"), vec![REPLY_OK]);
    }

    #[test]
    fn test_writes_need_reservation() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(None, 1000);

        assert_eq!(send(&mut port, &ctx, "0/0 p_comment \"x\""), vec![REPLY_NOT_RESERVED]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_create [0]"), vec![REPLY_NOT_RESERVED]);

        send(&mut port, &ctx, "0/0 p_reservation reserve");
        assert_eq!(send(&mut port, &ctx, "0/0 p_comment \"x\""), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 p_comment ?"), vec!["0/0 P_COMMENT \"x\""]);
    }

    #[test]
    fn test_stream_lifecycle() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);

        assert_eq!(send(&mut port, &ctx, "0/0 ps_indices ?"), vec!["0/0 PS_INDICES"]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_create [0]"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_create [0]"), vec![REPLY_BAD_INDEX]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_create [1]"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_indices ?"), vec!["0/0 PS_INDICES 0 1"]);

        assert_eq!(send(&mut port, &ctx, "0/0 ps_tpldid [1] 7"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_tpldid [1] ?"), vec!["0/0 PS_TPLDID [1] 7"]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_enable [1] maybe"), vec![REPLY_BAD_VALUE]);

        assert_eq!(send(&mut port, &ctx, "0/0 ps_delete [0]"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_indices ?"), vec!["0/0 PS_INDICES 1"]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_comment [0] ?"), vec![REPLY_BAD_INDEX]);
    }

    #[test]
    fn test_modifiers() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");

        assert_eq!(send(&mut port, &ctx, "0/0 ps_modifiercount [0] 2"), vec![REPLY_OK]);
        assert_eq!(
            send(&mut port, &ctx, "0/0 ps_modifier [0,1] 12 0xFF000000 RANDOM 1"),
            vec![REPLY_OK]
        );
        assert_eq!(
            send(&mut port, &ctx, "0/0 ps_modifier [0,1] ?"),
            vec!["0/0 PS_MODIFIER [0,1] 12 0xFF000000 RANDOM 1"]
        );
        assert_eq!(
            send(&mut port, &ctx, "0/0 ps_modifierrange [0,0] ?"),
            vec!["0/0 PS_MODIFIERRANGE [0,0] 0 1 65535"]
        );
        assert_eq!(send(&mut port, &ctx, "0/0 ps_modifier [0,2] ?"), vec![REPLY_BAD_INDEX]);
        assert_eq!(
            send(&mut port, &ctx, "0/0 ps_modifier [0,0] 12 0xFF000000"),
            vec![REPLY_BAD_VALUE]
        );
    }

    #[test]
    fn test_extended_modifiers_unsupported() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");

        assert_eq!(
            send(&mut port, &ctx, "0/0 ps_modifierextcount [0] ?"),
            vec![REPLY_SYNTAX_ERROR]
        );
    }

    #[test]
    fn test_full_config_replays() {
        let ctx = ctx(false);
        let mut source = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut source, &ctx, "0/0 p_comment \"saved\"");
        send(&mut source, &ctx, "0/0 ps_create [0]");
        send(&mut source, &ctx, "0/0 ps_comment [0] \"first\"");
        send(&mut source, &ctx, "0/0 ps_modifiercount [0] 1");
        send(&mut source, &ctx, "0/0 ps_modifier [0,0] 4 0xFFFF0000 DEC 2");

        let dump = send(&mut source, &ctx, "0/0 p_fullconfig ?");
        assert!(dump.contains(&"0/0 PS_INDICES 0".to_string()));

        let mut target = VirtualPort::new(Some(OWNER.to_string()), 1000);
        for line in &dump {
            assert_eq!(send(&mut target, &ctx, line), vec![REPLY_OK], "replaying {line}");
        }
        assert_eq!(send(&mut target, &ctx, "0/0 p_fullconfig ?"), dump);
    }

    #[test]
    fn test_reset_clears_streams() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");
        send(&mut port, &ctx, "0/0 p_traffic on");

        assert_eq!(send(&mut port, &ctx, "0/0 p_reset"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 ps_indices ?"), vec!["0/0 PS_INDICES"]);
        assert_eq!(send(&mut port, &ctx, "0/0 p_traffic ?"), vec!["0/0 P_TRAFFIC OFF"]);
    }

    #[test]
    fn test_stream_stats_advance_with_traffic() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");

        assert_eq!(send(&mut port, &ctx, "0/0 pt_stream [0] ?"), vec!["0/0 PT_STREAM [0] 0 0 0 0"]);
        send(&mut port, &ctx, "0/0 p_traffic on");
        assert_eq!(
            send(&mut port, &ctx, "0/0 pt_stream [0] ?"),
            vec!["0/0 PT_STREAM [0] 1000000 1488 64000 1000"]
        );
    }

    #[test]
    fn test_bounded_burst_completes() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");
        send(&mut port, &ctx, "0/0 ps_enable [0] on");
        send(&mut port, &ctx, "0/0 ps_packetlimit [0] 500");
        send(&mut port, &ctx, "0/0 p_traffic on");

        assert_eq!(send(&mut port, &ctx, "0/0 p_traffic ?"), vec!["0/0 P_TRAFFIC ON"]);
        assert_eq!(send(&mut port, &ctx, "0/0 p_traffic ?"), vec!["0/0 P_TRAFFIC OFF"]);
        assert_eq!(
            send(&mut port, &ctx, "0/0 pt_stream [0] ?"),
            vec!["0/0 PT_STREAM [0] 0 0 32000 500"]
        );
    }

    #[test]
    fn test_unbounded_traffic_keeps_running() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(Some(OWNER.to_string()), 1000);
        send(&mut port, &ctx, "0/0 ps_create [0]");
        send(&mut port, &ctx, "0/0 ps_enable [0] on");
        send(&mut port, &ctx, "0/0 p_traffic on");

        for _ in 0..3 {
            assert_eq!(send(&mut port, &ctx, "0/0 p_traffic ?"), vec!["0/0 P_TRAFFIC ON"]);
        }
    }

    #[test]
    fn test_port_totals_and_clear() {
        let ctx = ctx(false);
        let mut port = VirtualPort::new(None, 1000);
        assert_eq!(send(&mut port, &ctx, "0/0 pt_clear"), vec![REPLY_NOT_RESERVED]);

        send(&mut port, &ctx, "0/0 p_reservation reserve");
        send(&mut port, &ctx, "0/0 ps_create [0]");
        send(&mut port, &ctx, "0/0 ps_create [1]");
        send(&mut port, &ctx, "0/0 p_traffic on");
        send(&mut port, &ctx, "0/0 pt_stream [0] ?");
        send(&mut port, &ctx, "0/0 pt_stream [1] ?");

        assert_eq!(
            send(&mut port, &ctx, "0/0 pt_total ?"),
            vec!["0/0 PT_TOTAL 1000000 1488 128000 2000"]
        );
        assert_eq!(send(&mut port, &ctx, "0/0 pr_total ?"), vec!["0/0 PR_TOTAL 0 0 0 0"]);

        send(&mut port, &ctx, "0/0 p_traffic off");
        assert_eq!(send(&mut port, &ctx, "0/0 pt_clear"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 pr_clear"), vec![REPLY_OK]);
        assert_eq!(send(&mut port, &ctx, "0/0 pt_total ?"), vec!["0/0 PT_TOTAL 0 0 0 0"]);
        assert_eq!(send(&mut port, &ctx, "0/0 pt_total 5"), vec![REPLY_SYNTAX_ERROR]);
    }
}
