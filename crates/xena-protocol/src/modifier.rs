//! Stream modifier field encoding
//!
//! A modifier is configured with two commands. The main one carries
//! `position mask action repeat`, the range one carries `min step max` and
//! is only meaningful when the action is not [`ModifierAction::Random`].

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Standard (16-bit) or extended (32-bit) modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModifierType {
    Standard,
    Extended,
}

impl ModifierType {
    /// Command configuring position, mask, action and repeat
    pub fn command(&self) -> &'static str {
        match self {
            ModifierType::Standard => "ps_modifier",
            ModifierType::Extended => "ps_modifierext",
        }
    }

    /// Command configuring min, step and max
    pub fn range_command(&self) -> &'static str {
        match self {
            ModifierType::Standard => "ps_modifierrange",
            ModifierType::Extended => "ps_modifierextrange",
        }
    }

    /// Command holding the number of modifiers of this type on a stream
    pub fn count_command(&self) -> &'static str {
        match self {
            ModifierType::Standard => "ps_modifiercount",
            ModifierType::Extended => "ps_modifierextcount",
        }
    }
}

/// How the device walks the modified field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModifierAction {
    Increment,
    Decrement,
    Random,
}

impl ModifierAction {
    /// Wire keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifierAction::Increment => "INC",
            ModifierAction::Decrement => "DEC",
            ModifierAction::Random => "RANDOM",
        }
    }
}

impl fmt::Display for ModifierAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModifierAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INC" => Ok(ModifierAction::Increment),
            "DEC" => Ok(ModifierAction::Decrement),
            "RANDOM" => Ok(ModifierAction::Random),
            _ => Err(ParseError::InvalidAction(s.to_string())),
        }
    }
}

/// Value range walked by an incrementing or decrementing modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierRange {
    pub min: u32,
    pub step: u32,
    pub max: u32,
}

impl Default for ModifierRange {
    fn default() -> Self {
        Self {
            min: 0,
            step: 1,
            max: 65535,
        }
    }
}

/// Full configuration of one modifier
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierConfig {
    /// Byte offset of the modified field in the packet header
    pub position: u32,
    /// Bit mask applied to the field
    pub mask: u32,
    pub action: ModifierAction,
    /// Packets sent before the value moves on
    pub repeat: u32,
    /// Walked range; `None` for random modifiers
    pub range: Option<ModifierRange>,
}

impl ModifierConfig {
    /// Default incrementing modifier at `position`
    pub fn at(position: u32) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Arguments of the main modifier command
    pub fn encode_fields(&self) -> String {
        format!(
            "{} 0x{:08X} {} {}",
            self.position, self.mask, self.action, self.repeat
        )
    }

    /// Arguments of the range command, if the action uses one
    pub fn encode_range(&self) -> Option<String> {
        if self.action == ModifierAction::Random {
            return None;
        }
        let range = self.range.unwrap_or_default();
        Some(format!("{} {} {}", range.min, range.step, range.max))
    }

    /// Decode the main command value and, for non-random actions, the range value
    pub fn decode(fields: &str, range: Option<&str>) -> Result<Self, ParseError> {
        let parts: Vec<&str> = fields.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(ParseError::FieldCount {
                attribute: "modifier".to_string(),
                expected: 4,
                actual: parts.len(),
                reply: fields.to_string(),
            });
        }

        let position = parse_number("modifier position", parts[0])?;
        let mask = parse_hex(parts[1])?;
        let action: ModifierAction = parts[2].parse()?;
        let repeat = parse_number("modifier repeat", parts[3])?;

        let range = match (action, range) {
            (ModifierAction::Random, _) | (_, None) => None,
            (_, Some(value)) => Some(decode_range(value)?),
        };

        Ok(Self {
            position,
            mask,
            action,
            repeat,
            range,
        })
    }
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            position: 0,
            mask: 0xFFFF_0000,
            action: ModifierAction::Increment,
            repeat: 1,
            range: Some(ModifierRange::default()),
        }
    }
}

fn decode_range(value: &str) -> Result<ModifierRange, ParseError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(ParseError::FieldCount {
            attribute: "modifier range".to_string(),
            expected: 3,
            actual: parts.len(),
            reply: value.to_string(),
        });
    }
    Ok(ModifierRange {
        min: parse_number("modifier min", parts[0])?,
        step: parse_number("modifier step", parts[1])?,
        max: parse_number("modifier max", parts[2])?,
    })
}

fn parse_number(attribute: &str, value: &str) -> Result<u32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

/// Parse a hex number with an optional `0x` prefix
pub fn parse_hex(value: &str) -> Result<u32, ParseError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidHex(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_default() {
        let config = ModifierConfig::at(12);
        assert_eq!(config.encode_fields(), "12 0xFFFF0000 INC 1");
        assert_eq!(config.encode_range().as_deref(), Some("0 1 65535"));
    }

    #[test]
    fn test_random_has_no_range() {
        let config = ModifierConfig {
            action: ModifierAction::Random,
            range: None,
            ..ModifierConfig::at(4)
        };
        assert_eq!(config.encode_fields(), "4 0xFFFF0000 RANDOM 1");
        assert!(config.encode_range().is_none());
    }

    #[test]
    fn test_decode() {
        let config = ModifierConfig::decode("4 0xffff0000 DEC 2", Some("10 2 100")).unwrap();
        assert_eq!(config.position, 4);
        assert_eq!(config.mask, 0xFFFF_0000);
        assert_eq!(config.action, ModifierAction::Decrement);
        assert_eq!(config.repeat, 2);
        assert_eq!(
            config.range,
            Some(ModifierRange {
                min: 10,
                step: 2,
                max: 100
            })
        );
    }

    #[test]
    fn test_decode_random_ignores_range() {
        let config = ModifierConfig::decode("0 0xFF000000 RANDOM 1", Some("0 1 65535")).unwrap();
        assert_eq!(config.action, ModifierAction::Random);
        assert!(config.range.is_none());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ModifierConfig::decode("4 0xffff0000 INC", None),
            Err(ParseError::FieldCount { expected: 4, actual: 3, .. })
        ));
        assert!(matches!(
            ModifierConfig::decode("4 zz INC 1", None),
            Err(ParseError::InvalidHex(_))
        ));
        assert!(matches!(
            ModifierConfig::decode("4 0xFF SHUFFLE 1", None),
            Err(ParseError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(ModifierType::Standard.command(), "ps_modifier");
        assert_eq!(ModifierType::Extended.range_command(), "ps_modifierextrange");
        assert_eq!(ModifierType::Extended.count_command(), "ps_modifierextcount");
    }
}
