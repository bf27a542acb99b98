//! Error types for the object model

use std::str::FromStr;

use thiserror::Error;
use xena_channel::{ChannelError, TransportError};
use xena_protocol::{AddressError, ObjectKind, ParseError};

/// Errors that can occur while driving chassis objects
#[derive(Debug, Error)]
pub enum XenaError {
    /// Transport failure or rejected verified command
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Reply could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Location string could not be addressed
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Object was removed or never existed
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// An object with the same reference already exists
    #[error("object already exists: {0}")]
    ObjectExists(String),

    /// Handle or reference points at an object of another kind
    #[error("{reference} is a {actual}, expected a {expected}")]
    WrongKind {
        reference: String,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// Chassis address not added to the session
    #[error("unknown chassis: {0}")]
    UnknownChassis(String),

    /// Port or module held by another user and force was not requested
    #[error("{location} is reserved by {owner}")]
    ReservedByOther { location: String, owner: String },

    /// Feature not available on this hardware variant
    #[error("{reference} does not support {feature}")]
    Unsupported { reference: String, feature: String },

    /// Attribute did not reach the expected value in time
    #[error("{reference} {attribute} did not become {expected} within {waited_ms}ms")]
    Timeout {
        reference: String,
        attribute: String,
        expected: String,
        waited_ms: u64,
    },

    /// Configuration file could not be read or written
    #[error("config file error: {0}")]
    Config(#[from] std::io::Error),
}

impl From<TransportError> for XenaError {
    fn from(e: TransportError) -> Self {
        XenaError::Channel(ChannelError::Transport(e))
    }
}

impl XenaError {
    /// Whether the device rejected a verified command
    pub fn is_rejection(&self) -> bool {
        matches!(self, XenaError::Channel(e) if e.is_rejection())
    }
}

/// Result alias for object model operations
pub type XenaResult<T> = Result<T, XenaError>;

/// Parse a numeric field of an `attribute` reply
pub(crate) fn parse_number<T: FromStr>(attribute: &str, value: &str) -> XenaResult<T> {
    value.trim().parse().map_err(|_| {
        XenaError::Parse(ParseError::InvalidNumber {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    })
}
