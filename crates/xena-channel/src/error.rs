//! Error types for the connection and command channel

use std::io;

use thiserror::Error;

/// Socket-level failures; always fatal to the current call
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation needs an open connection
    #[error("not connected")]
    NotConnected,

    /// Operation needs a closed connection
    #[error("already connected")]
    AlreadyConnected,

    /// Remote refused or could not be resolved
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Connect did not complete within the configured timeout
    #[error("connect to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: String, timeout_ms: u64 },

    /// No reply bytes within the configured timeout
    #[error("no reply within {timeout_ms}ms")]
    ReadTimeout { timeout_ms: u64 },

    /// Peer closed the connection
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by command channel exchanges
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Verified command answered with something other than the success sentinel
    #[error("command {command:?} failed: expected {expected:?}, got {actual:?}")]
    CommandRejected {
        command: String,
        expected: String,
        actual: String,
    },
}

impl ChannelError {
    /// Whether this is a device-side rejection rather than a transport failure
    pub fn is_rejection(&self) -> bool {
        matches!(self, ChannelError::CommandRejected { .. })
    }
}
