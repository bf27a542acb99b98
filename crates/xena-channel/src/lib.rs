//! Xena Command Channel
//!
//! This crate owns the socket to a chassis and turns the unframed text
//! protocol into discrete exchanges:
//!
//! - [`Connection`]: one TCP socket (or an in-memory virtual chassis in
//!   dummy mode) with line send and raw chunk receive
//! - [`CommandChannel`]: the protocol state machine; commands, single-reply
//!   queries, `SYNC`-terminated multi-reply queries and verified commands,
//!   all serialized through one async mutex
//! - [`KeepAlive`]: a background task sending periodic no-op queries
//!   through the same channel
//!
//! No operation is retried. Transport failures surface to the caller; a
//! rejected multi-reply query reads as "no data".

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod keepalive;

pub use channel::CommandChannel;
pub use config::{ChannelConfig, ConnectionConfig};
pub use connection::Connection;
pub use error::{ChannelError, TransportError};
pub use keepalive::{KeepAlive, KeepAliveCommand};
