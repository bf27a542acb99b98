//! Line framing for the Xena text protocol
//!
//! The chassis protocol has no length prefix and no reply count. Every
//! command and every reply is a single `\n`-terminated ASCII line, but one
//! socket read may deliver several replies back to back, or stop in the
//! middle of one. [`LineCodec`] buffers raw reads and hands out complete
//! lines; [`Reply::classify`] sorts each line into the classes the command
//! channel cares about.

use crate::{REPLY_OK, SYNC_REPLY, SYNTAX_MARKER};

/// Upper bound for a buffered partial line before it is discarded
const MAX_LINE_LEN: usize = 64 * 1024;

/// Streaming line splitter
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Push raw bytes into the codec's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A line this long without a terminator is garbage; keep the tail only
        if self.buffer.len() > MAX_LINE_LEN && !self.buffer.contains(&b'\n') {
            tracing::warn!(
                "Discarding {} unterminated bytes from reply buffer",
                self.buffer.len()
            );
            let start = self.buffer.len() - 1024;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    /// Convenience wrapper for pushing text
    pub fn push_str(&mut self, data: &str) {
        self.push_bytes(data.as_bytes());
    }

    /// Try to extract the next complete line (terminator and trailing `\r` stripped)
    pub fn next_line(&mut self) -> Option<String> {
        let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();

        let mut line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of a single reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// End-of-burst marker answering a `SYNC` command
    Sync,
    /// Device rejected the command text
    SyntaxError(String),
    /// Command accepted
    Ok,
    /// Anything else: an echoed attribute value or a non-OK status
    Data(String),
}

impl Reply {
    /// Sort a reply line into its class
    ///
    /// Rejections are recognized by the `Syntax` marker anywhere in the
    /// line, the way the chassis reports them (`#Syntax error ...`).
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed == SYNC_REPLY {
            Reply::Sync
        } else if trimmed.contains(SYNTAX_MARKER) {
            Reply::SyntaxError(trimmed.to_string())
        } else if trimmed == REPLY_OK {
            Reply::Ok
        } else {
            Reply::Data(line.to_string())
        }
    }

    /// Whether this line ends a multi-reply burst
    pub fn is_sync(&self) -> bool {
        matches!(self, Reply::Sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_line() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"<OK>\n");

        assert_eq!(codec.next_line(), Some("<OK>".to_string()));
        assert!(codec.next_line().is_none());
    }

    #[test]
    fn test_streaming_parse() {
        let mut codec = LineCodec::new();

        codec.push_bytes(b"0/1 P_SPE");
        assert!(codec.next_line().is_none());

        codec.push_bytes(b"ED 1000\n");
        assert_eq!(codec.next_line(), Some("0/1 P_SPEED 1000".to_string()));
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"0/0 P_SPEED 1000\n0/1 P_SPEED 1000\n<SYNC>\n");

        assert_eq!(codec.next_line().as_deref(), Some("0/0 P_SPEED 1000"));
        assert_eq!(codec.next_line().as_deref(), Some("0/1 P_SPEED 1000"));
        assert_eq!(codec.next_line().as_deref(), Some("<SYNC>"));
        assert!(codec.next_line().is_none());
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"<OK>\r\n");
        assert_eq!(codec.next_line().as_deref(), Some("<OK>"));
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"stale");
        codec.clear();
        codec.push_bytes(b"<OK>\n");
        assert_eq!(codec.next_line().as_deref(), Some("<OK>"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(Reply::classify("<SYNC>"), Reply::Sync);
        assert_eq!(Reply::classify("  <SYNC> "), Reply::Sync);
        assert_eq!(Reply::classify("<OK>"), Reply::Ok);
        assert!(matches!(
            Reply::classify("#Syntax error in command"),
            Reply::SyntaxError(_)
        ));
        assert_eq!(
            Reply::classify("0 M_PORTCOUNT 4"),
            Reply::Data("0 M_PORTCOUNT 4".to_string())
        );
        assert_eq!(
            Reply::classify("<NOTRESERVED>"),
            Reply::Data("<NOTRESERVED>".to_string())
        );
    }

    #[test]
    fn test_sync_must_be_whole_line() {
        assert!(!Reply::classify("0/1 PS_COMMENT [0] \"<SYNC>\"").is_sync());
    }

    proptest! {
        #[test]
        fn arbitrary_chunking_yields_same_lines(
            lines in prop::collection::vec("[A-Z0-9_/ \\[\\],]{0,40}", 1..12),
            cut in 1usize..17,
        ) {
            let wire: String = lines.iter().map(|l| format!("{l}\n")).collect();

            let mut codec = LineCodec::new();
            let mut decoded = Vec::new();
            for chunk in wire.as_bytes().chunks(cut) {
                codec.push_bytes(chunk);
                while let Some(line) = codec.next_line() {
                    decoded.push(line);
                }
            }

            prop_assert_eq!(decoded, lines);
            prop_assert_eq!(codec.pending(), 0);
        }
    }
}
