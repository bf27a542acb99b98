//! Xena Chassis Simulation Library
//!
//! This crate provides a simulation layer for exercising the chassis client
//! without physical hardware. It includes:
//!
//! - **VirtualChassis**: answers protocol command lines with the chassis'
//!   echo format, sentinels and error replies, tracking modules, ports,
//!   reservations, streams and modifiers
//! - **run_virtual_chassis_task**: drives a VirtualChassis over any async
//!   byte stream, typically one half of `tokio::io::duplex`
//!
//! # Example
//!
//! ```rust
//! use xena_sim::{VirtualChassis, VirtualChassisConfig};
//!
//! let mut chassis = VirtualChassis::from_config("lab", &VirtualChassisConfig::default());
//!
//! assert_eq!(chassis.handle_line("c_logon \"xena\""), vec!["<OK>"]);
//! assert_eq!(chassis.handle_line("0 m_portcount ?"), vec!["0 M_PORTCOUNT 2"]);
//! ```

pub mod chassis;
pub mod chassis_task;
mod port;
mod request;

pub use chassis::{VirtualChassis, VirtualChassisConfig, VirtualModuleConfig};
pub use chassis_task::{run_virtual_chassis_task, VirtualChassisCommand};

/// Reply to a command the chassis does not understand
pub const REPLY_SYNTAX_ERROR: &str = "#Syntax error";

/// Reply to a write on an object not reserved by the session owner
pub const REPLY_NOT_RESERVED: &str = "<NOTRESERVED>";

/// Reply to a reservation attempt on an object held by someone else
pub const REPLY_RESERVED_BY_OTHER: &str = "<RESERVEDBYOTHER>";

/// Reply to any command but logon before a successful logon
pub const REPLY_NOT_LOGGED_ON: &str = "<NOTLOGGEDON>";

/// Reply to a wrong logon password
pub const REPLY_BAD_PASSWORD: &str = "<BADPASSWORD>";

/// Reply naming a module slot that does not exist
pub const REPLY_BAD_MODULE: &str = "<BADMODULE>";

/// Reply naming a port that does not exist
pub const REPLY_BAD_PORT: &str = "<BADPORT>";

/// Reply naming a stream or modifier index that does not exist (or already does)
pub const REPLY_BAD_INDEX: &str = "<BADINDEX>";

/// Reply to a malformed attribute value
pub const REPLY_BAD_VALUE: &str = "<BADVALUE>";

/// Owner holding the ports listed in `VirtualModuleConfig::reserved_by_other`
pub const OTHER_OWNER: &str = "other-user";
