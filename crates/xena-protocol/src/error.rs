//! Error types for Xena protocol parsing and addressing

use thiserror::Error;

/// Errors that can occur while parsing reply data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Reply did not carry the expected number of fields
    #[error("expected {expected} fields in {attribute} reply, got {actual}: {reply:?}")]
    FieldCount {
        attribute: String,
        expected: usize,
        actual: usize,
        reply: String,
    },

    /// Numeric field could not be parsed
    #[error("invalid number in {attribute} reply: {value:?}")]
    InvalidNumber { attribute: String, value: String },

    /// Keyword field not one of the accepted values
    #[error("invalid value in {attribute} reply: {value:?}")]
    InvalidValue { attribute: String, value: String },

    /// Hexadecimal field could not be parsed
    #[error("invalid hex value: {0:?}")]
    InvalidHex(String),

    /// Modifier action keyword not recognized
    #[error("invalid modifier action: {0:?}")]
    InvalidAction(String),

    /// Reply did not echo the expected address
    #[error("reply does not match {attribute}: {reply:?}")]
    UnexpectedEcho { attribute: String, reply: String },
}

/// Errors raised when a user-supplied location string cannot be addressed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Wrong number of index components for the kind
    #[error("{kind} location needs {expected} index components, got {actual} in {location:?}")]
    Arity {
        kind: &'static str,
        expected: usize,
        actual: usize,
        location: String,
    },

    /// Index component is not a non-negative integer
    #[error("invalid index component {component:?} in {location:?}")]
    InvalidComponent { component: String, location: String },

    /// Full port location is missing the chassis address
    #[error("location {0:?} is not of the form <chassis>/<module>/<port>")]
    MissingChassis(String),
}
