//! Xena Protocol Library
//!
//! This crate provides framing, addressing and reply parsing for the
//! line-oriented text protocol spoken by Xena traffic-generator chassis.
//!
//! # Architecture
//!
//! - [`codec`]: a streaming line splitter, since one socket read may carry
//!   several replies or half of one, plus reply classification
//!   (sync sentinel, success sentinel, syntax rejection, data)
//! - [`location`]: object kinds and their index chains, command building
//!   and echo stripping
//! - [`modifier`]: encoding of stream modifier fields
//! - [`value`]: quoting and hex blob helpers for attribute values
//!
//! Nothing in this crate does I/O.
//!
//! # Example
//!
//! ```rust
//! use xena_protocol::{Location, ObjectKind, LineCodec, Reply};
//!
//! let port = Location::new(ObjectKind::Port, vec![0, 1]);
//! assert_eq!(port.build_command("p_speed", &["?"]), "0/1 p_speed ?");
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"0/1 P_SPEED 1000\n<SYNC>\n");
//!
//! let line = codec.next_line().unwrap();
//! assert_eq!(port.extract_value("p_speed", &line), Some("1000"));
//! assert_eq!(Reply::classify(&codec.next_line().unwrap()), Reply::Sync);
//! ```

pub mod codec;
pub mod error;
pub mod location;
pub mod modifier;
pub mod value;

pub use codec::{LineCodec, Reply};
pub use error::{AddressError, ParseError};
pub use location::{split_port_location, Location, ObjectKind};
pub use modifier::{ModifierAction, ModifierConfig, ModifierRange, ModifierType};

/// Terminator appended to every command and reply
pub const LINE_TERMINATOR: char = '\n';

/// Control command asking the chassis to emit [`SYNC_REPLY`]
pub const SYNC_COMMAND: &str = "SYNC";

/// Sentinel ending a multi-reply burst
pub const SYNC_REPLY: &str = "<SYNC>";

/// Success sentinel for verified commands
pub const REPLY_OK: &str = "<OK>";

/// Marker identifying a rejected command
pub const SYNTAX_MARKER: &str = "Syntax";

/// Default chassis command port
pub const DEFAULT_PORT: u16 = 22611;

/// No-op query used to keep an idle session open
pub const KEEPALIVE_COMMAND: &str = "C_KEEPALIVE ?";
