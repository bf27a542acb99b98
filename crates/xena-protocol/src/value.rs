//! Helpers for attribute value text

use crate::error::ParseError;

/// Wrap a free-text value in double quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Strip one pair of surrounding double quotes, if present
pub fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Encode a byte blob as the device's `0x`-prefixed hex form
pub fn encode_hex_blob(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

/// Decode a `0x`-prefixed hex blob
pub fn decode_hex_blob(value: &str) -> Result<Vec<u8>, ParseError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(ParseError::InvalidHex(value.to_string()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ParseError::InvalidHex(value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_unquote() {
        assert_eq!(quote("first stream"), "\"first stream\"");
        assert_eq!(unquote("\"first stream\""), "first stream");
        assert_eq!(unquote("  plain "), "plain");
        assert_eq!(unquote("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn test_hex_blob() {
        let blob = [0x00, 0x11, 0xAB, 0xFF];
        assert_eq!(encode_hex_blob(&blob), "0x0011ABFF");
        assert_eq!(decode_hex_blob("0x0011abff").unwrap(), blob);
        assert_eq!(decode_hex_blob("0x").unwrap(), Vec::<u8>::new());
        assert!(decode_hex_blob("0x123").is_err());
        assert!(decode_hex_blob("0xZZ").is_err());
    }
}
