//! Object kinds, locations and command addressing
//!
//! Every chassis attribute is reached through a location-encoded prefix.
//! Chassis-scoped commands carry no address, module commands carry the
//! module number, port commands carry `module/port`, and stream and
//! modifier commands add a bracketed sub-index after the command name:
//!
//! ```text
//! c_portcounts ?
//! 0 m_portcount ?
//! 0/1 p_reservation reserve
//! 0/1 ps_comment [3] "first stream"
//! 0/1 ps_modifier [3,0] 12 0xFFFF0000 INC 1
//! ```
//!
//! The chassis echoes the address and the upper-cased command name in
//! front of every value it returns, e.g. `0/1 PS_COMMENT [3] "first stream"`.

use std::fmt;

use crate::error::AddressError;
use crate::modifier::ModifierType;

/// Kind of an addressable chassis object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectKind {
    /// Scripting session, root of the object tree
    Session,
    /// Chassis reached over its own TCP connection
    Chassis,
    /// Test module (slot)
    Module,
    /// Physical port on a module
    Port,
    /// Traffic stream defined on a port
    Stream,
    /// Field modifier attached to a stream
    Modifier(ModifierType),
}

impl ObjectKind {
    /// Number of numeric index components in this kind's address
    pub fn index_len(&self) -> usize {
        match self {
            ObjectKind::Session | ObjectKind::Chassis => 0,
            ObjectKind::Module => 1,
            ObjectKind::Port => 2,
            ObjectKind::Stream => 3,
            ObjectKind::Modifier(_) => 4,
        }
    }

    /// Segment name used in object references
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Session => "session",
            ObjectKind::Chassis => "chassis",
            ObjectKind::Module => "module",
            ObjectKind::Port => "port",
            ObjectKind::Stream => "stream",
            ObjectKind::Modifier(ModifierType::Standard) => "modifier",
            ObjectKind::Modifier(ModifierType::Extended) => "xmodifier",
        }
    }

    /// Command-name prefix of attributes owned by this kind
    pub fn cli_prefix(&self) -> &'static str {
        match self {
            ObjectKind::Session | ObjectKind::Chassis => "c",
            ObjectKind::Module => "m",
            ObjectKind::Port => "p",
            ObjectKind::Stream | ObjectKind::Modifier(_) => "ps",
        }
    }

    /// Bulk queries whose replies make up this kind's info/config snapshot
    pub fn info_commands(&self) -> &'static [&'static str] {
        match self {
            ObjectKind::Session => &[],
            ObjectKind::Chassis => &["c_info", "c_config"],
            ObjectKind::Module => &["m_info", "m_config", "m_portcount"],
            ObjectKind::Port => &["p_info", "p_config", "p_receivesync"],
            ObjectKind::Stream => &["ps_config"],
            ObjectKind::Modifier(_) => &[],
        }
    }

    /// Whether commands for this kind carry a bracketed sub-index
    fn has_bracket(&self) -> bool {
        matches!(self, ObjectKind::Stream | ObjectKind::Modifier(_))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of an object on its chassis: kind plus numeric index chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    kind: ObjectKind,
    index: Vec<u32>,
}

impl Location {
    /// Create a location
    ///
    /// # Panics
    ///
    /// Panics if `index` does not have exactly `kind.index_len()` components.
    /// Addressing an object with the wrong arity is a programming error.
    pub fn new(kind: ObjectKind, index: impl Into<Vec<u32>>) -> Self {
        let index = index.into();
        assert_eq!(
            index.len(),
            kind.index_len(),
            "{} location needs {} index components, got {:?}",
            kind,
            kind.index_len(),
            index
        );
        Self { kind, index }
    }

    /// Location of the chassis itself
    pub fn chassis() -> Self {
        Self::new(ObjectKind::Chassis, Vec::new())
    }

    /// Location of the session root (no address, no index)
    pub fn session() -> Self {
        Self::new(ObjectKind::Session, Vec::new())
    }

    /// Parse a `/`-separated index chain such as `"0/1"` for `kind`
    pub fn parse(kind: ObjectKind, text: &str) -> Result<Self, AddressError> {
        let text = text.trim();
        let components: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split('/').collect()
        };

        if components.len() != kind.index_len() {
            return Err(AddressError::Arity {
                kind: kind.name(),
                expected: kind.index_len(),
                actual: components.len(),
                location: text.to_string(),
            });
        }

        let index = components
            .iter()
            .map(|c| {
                c.trim()
                    .parse::<u32>()
                    .map_err(|_| AddressError::InvalidComponent {
                        component: c.to_string(),
                        location: text.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { kind, index })
    }

    /// Kind of the addressed object
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Full index chain
    pub fn index(&self) -> &[u32] {
        &self.index
    }

    /// Last index component (the object's index within its parent)
    pub fn last(&self) -> Option<u32> {
        self.index.last().copied()
    }

    /// Location of a child of `kind` at `index` below this location
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not exactly one level deeper than this location.
    pub fn child(&self, kind: ObjectKind, index: u32) -> Self {
        let mut chain = self.index.clone();
        chain.push(index);
        Self::new(kind, chain)
    }

    /// Leading address token: `m` for modules, `m/p` for ports and below
    pub fn address_token(&self) -> Option<String> {
        match self.index.as_slice() {
            [] => None,
            [module] => Some(module.to_string()),
            [module, port, ..] => Some(format!("{module}/{port}")),
        }
    }

    /// Bracketed sub-index: `[s]` for streams, `[s,k]` for modifiers
    pub fn bracket(&self) -> Option<String> {
        if !self.kind.has_bracket() {
            return None;
        }
        let inner: Vec<String> = self.index[2..].iter().map(|i| i.to_string()).collect();
        Some(format!("[{}]", inner.join(",")))
    }

    /// Build the command line for `command` with `args` addressed to this location
    pub fn build_command<S: AsRef<str>>(&self, command: &str, args: &[S]) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(3 + args.len());
        if let Some(address) = self.address_token() {
            parts.push(address);
        }
        parts.push(command.to_string());
        if let Some(bracket) = self.bracket() {
            parts.push(bracket);
        }
        parts.extend(args.iter().map(|a| a.as_ref().to_string()));
        parts.join(" ")
    }

    /// Render the reply the chassis sends for `command` with `value` at this location
    pub fn echo(&self, command: &str, value: &str) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);
        if let Some(address) = self.address_token() {
            parts.push(address);
        }
        parts.push(command.to_ascii_uppercase());
        if let Some(bracket) = self.bracket() {
            parts.push(bracket);
        }
        if !value.is_empty() {
            parts.push(value.to_string());
        }
        parts.join(" ")
    }

    /// Strip the echoed address and command name from a reply
    ///
    /// The command name is matched case-insensitively and whitespace
    /// between tokens (including inside the bracket) is ignored. Returns
    /// `None` when the reply does not start with this location's echo.
    pub fn extract_value<'a>(&self, command: &str, reply: &'a str) -> Option<&'a str> {
        let mut rest = reply;
        if let Some(address) = self.address_token() {
            rest = strip_token(rest, &address)?;
        }
        rest = strip_token(rest, command)?;
        if self.kind.has_bracket() {
            rest = strip_bracket(rest, &self.index[2..])?;
        }
        Some(rest.trim())
    }

    /// Split one line of a bulk reply into `(attribute, value)`
    ///
    /// The attribute name is lower-cased. The address token and bracket are
    /// skipped without being checked, since bulk replies may cover several
    /// sub-objects.
    pub fn split_reply(&self, line: &str) -> Option<(String, String)> {
        let mut rest = line.trim_start();
        if self.address_token().is_some() {
            rest = skip_token(rest)?;
        }

        let rest_trimmed = rest.trim_start();
        let name_end = rest_trimmed
            .find(|c: char| c.is_whitespace() || c == '[')
            .unwrap_or(rest_trimmed.len());
        if name_end == 0 {
            return None;
        }
        let attribute = rest_trimmed[..name_end].to_ascii_lowercase();
        let mut value = rest_trimmed[name_end..].trim_start();

        if value.starts_with('[') {
            if let Some(close) = value.find(']') {
                value = value[close + 1..].trim_start();
            }
        }

        Some((attribute, value.trim_end().to_string()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.index.iter().map(|i| i.to_string()).collect();
        f.write_str(&parts.join("/"))
    }
}

/// Split a full port location `"<chassis>/<module>/<port>"` into chassis address and location
pub fn split_port_location(text: &str) -> Result<(String, Location), AddressError> {
    let text = text.trim();
    let mut parts = text.rsplitn(3, '/');
    let port = parts.next();
    let module = parts.next();
    let chassis = parts.next();

    match (chassis, module, port) {
        (Some(chassis), Some(module), Some(port)) if !chassis.is_empty() => {
            let location = Location::parse(ObjectKind::Port, &format!("{module}/{port}"))?;
            Ok((chassis.to_string(), location))
        }
        _ => Err(AddressError::MissingChassis(text.to_string())),
    }
}

/// Consume `token` (case-insensitive) at the start of `input`, after leading whitespace
fn strip_token<'a>(input: &'a str, token: &str) -> Option<&'a str> {
    let input = input.trim_start();
    let head = input.get(..token.len())?;
    if !head.eq_ignore_ascii_case(token) {
        return None;
    }
    let rest = &input[token.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '[' => Some(rest),
        Some(_) => None,
    }
}

/// Consume one whitespace-delimited token
fn skip_token(input: &str) -> Option<&str> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    Some(&input[end..])
}

/// Consume a bracketed index list matching `expected`, tolerating inner whitespace
fn strip_bracket<'a>(input: &'a str, expected: &[u32]) -> Option<&'a str> {
    let input = input.trim_start();
    let inner_start = input.strip_prefix('[')?;
    let close = inner_start.find(']')?;
    let inner = &inner_start[..close];

    let mut values = inner.split(',').map(|c| c.trim().parse::<u32>());
    for want in expected {
        match values.next() {
            Some(Ok(got)) if got == *want => {}
            _ => return None,
        }
    }
    if values.next().is_some() {
        return None;
    }

    Some(&inner_start[close + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stream(m: u32, p: u32, s: u32) -> Location {
        Location::new(ObjectKind::Stream, vec![m, p, s])
    }

    #[test]
    fn test_build_commands_per_kind() {
        assert_eq!(
            Location::chassis().build_command("c_logon", &["\"xena\""]),
            "c_logon \"xena\""
        );
        assert_eq!(
            Location::new(ObjectKind::Module, vec![0]).build_command("m_portcount", &["?"]),
            "0 m_portcount ?"
        );
        assert_eq!(
            Location::new(ObjectKind::Port, vec![0, 1]).build_command("p_reservation", &["reserve"]),
            "0/1 p_reservation reserve"
        );
        assert_eq!(
            stream(0, 1, 3).build_command("ps_comment", &["\"first stream\""]),
            "0/1 ps_comment [3] \"first stream\""
        );
        assert_eq!(
            Location::new(ObjectKind::Modifier(ModifierType::Standard), vec![0, 1, 3, 0])
                .build_command("ps_modifier", &["?"]),
            "0/1 ps_modifier [3,0] ?"
        );
    }

    #[test]
    fn test_build_command_without_args() {
        let no_args: [&str; 0] = [];
        assert_eq!(stream(1, 0, 2).build_command("ps_create", &no_args), "1/0 ps_create [2]");
    }

    #[test]
    #[should_panic]
    fn test_wrong_arity_panics() {
        let _ = Location::new(ObjectKind::Port, vec![0]);
    }

    #[test]
    fn test_parse_location() {
        let loc = Location::parse(ObjectKind::Port, "2/3").unwrap();
        assert_eq!(loc.index(), &[2, 3]);
        assert_eq!(loc.to_string(), "2/3");

        assert!(matches!(
            Location::parse(ObjectKind::Port, "2"),
            Err(AddressError::Arity { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            Location::parse(ObjectKind::Module, "x"),
            Err(AddressError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn test_split_port_location() {
        let (chassis, loc) = split_port_location("10.0.0.1/0/1").unwrap();
        assert_eq!(chassis, "10.0.0.1");
        assert_eq!(loc, Location::new(ObjectKind::Port, vec![0, 1]));

        assert!(matches!(
            split_port_location("0/1"),
            Err(AddressError::MissingChassis(_))
        ));
    }

    #[test]
    fn test_extract_value() {
        let loc = stream(0, 1, 3);
        assert_eq!(
            loc.extract_value("ps_tpldid", "0/1 PS_TPLDID [3] 7"),
            Some("7")
        );
        assert_eq!(
            loc.extract_value("ps_tpldid", "  0/1   ps_TplDid  [ 3 ]   7  "),
            Some("7")
        );
        assert_eq!(loc.extract_value("ps_tpldid", "0/1 PS_TPLDID [4] 7"), None);
        assert_eq!(loc.extract_value("ps_tpldid", "<NOTVALID>"), None);
    }

    #[test]
    fn test_extract_value_requires_token_boundary() {
        let loc = Location::new(ObjectKind::Port, vec![0, 0]);
        assert_eq!(loc.extract_value("p_speed", "0/0 P_SPEEDSELECTION AUTO"), None);
        assert_eq!(loc.extract_value("p_speed", "0/0 P_SPEED 1000"), Some("1000"));
    }

    #[test]
    fn test_extract_empty_value() {
        let loc = Location::new(ObjectKind::Port, vec![0, 0]);
        assert_eq!(loc.extract_value("ps_indices", "0/0 PS_INDICES"), Some(""));
    }

    #[test]
    fn test_chassis_echo() {
        let loc = Location::chassis();
        assert_eq!(loc.echo("c_portcounts", "4 0"), "C_PORTCOUNTS 4 0");
        assert_eq!(loc.extract_value("c_portcounts", "C_PORTCOUNTS 4 0"), Some("4 0"));
    }

    #[test]
    fn test_split_reply() {
        let port = Location::new(ObjectKind::Port, vec![0, 1]);
        assert_eq!(
            port.split_reply("0/1 P_SPEED 1000"),
            Some(("p_speed".to_string(), "1000".to_string()))
        );
        assert_eq!(
            stream(0, 1, 0).split_reply("0/1 PS_COMMENT [0] \"a b\""),
            Some(("ps_comment".to_string(), "\"a b\"".to_string()))
        );
        assert_eq!(
            Location::chassis().split_reply("C_MODEL XenaBay"),
            Some(("c_model".to_string(), "XenaBay".to_string()))
        );
        assert_eq!(
            port.split_reply("0/1 P_COMMENT"),
            Some(("p_comment".to_string(), String::new()))
        );
        assert_eq!(port.split_reply("   "), None);
    }

    #[test]
    fn test_reference_segments() {
        assert_eq!(ObjectKind::Modifier(ModifierType::Standard).name(), "modifier");
        assert_eq!(ObjectKind::Modifier(ModifierType::Extended).name(), "xmodifier");
        assert_eq!(ObjectKind::Stream.cli_prefix(), "ps");
    }

    fn any_location() -> impl Strategy<Value = Location> {
        let kind = prop_oneof![
            Just(ObjectKind::Chassis),
            Just(ObjectKind::Module),
            Just(ObjectKind::Port),
            Just(ObjectKind::Stream),
            Just(ObjectKind::Modifier(ModifierType::Standard)),
            Just(ObjectKind::Modifier(ModifierType::Extended)),
        ];
        kind.prop_flat_map(|kind| {
            prop::collection::vec(0u32..64, kind.index_len())
                .prop_map(move |index| Location::new(kind, index))
        })
    }

    proptest! {
        #[test]
        fn echo_then_extract_returns_value(
            location in any_location(),
            command in "[a-z]{1,3}_[a-z]{1,12}",
            value in "[A-Za-z0-9\"x ]{0,24}",
        ) {
            let reply = location.echo(&command, &value);
            prop_assert_eq!(location.extract_value(&command, &reply), Some(value.trim()));
        }

        #[test]
        fn build_command_starts_with_echo_address(
            location in any_location(),
            command in "[a-z]{1,3}_[a-z]{1,12}",
        ) {
            let built = location.build_command(&command, &["?"]);
            let echoed = location.echo(&command, "");
            prop_assert_eq!(built.to_ascii_uppercase(), format!("{} ?", echoed));
        }
    }
}
