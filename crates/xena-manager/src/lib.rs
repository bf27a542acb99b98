//! Xena Chassis Manager
//!
//! This crate models a traffic-generator test bed as a tree of addressable
//! objects rooted at a [`Session`]:
//!
//! ```text
//! session
//! └── chassis (one TCP connection each)
//!     └── module
//!         └── port
//!             └── stream
//!                 └── modifier / xmodifier
//! ```
//!
//! Every object knows its reference and location, caches the attribute
//! values it has read or written, and discovers its children from the
//! device on first use. All I/O goes through the [`XenaTransport`] trait;
//! [`CliTransport`] implements it over the chassis command line, against
//! real hardware or an in-memory virtual chassis in dummy mode.
//!
//! # Example
//!
//! ```rust,no_run
//! use xena_manager::{Session, SessionConfig, StreamConfig};
//!
//! # async fn run() -> xena_manager::XenaResult<()> {
//! let mut session = Session::cli(SessionConfig::default());
//! session.add_chassis("192.168.1.10", 22611, "xena").await?;
//!
//! let ports = session.reserve_ports(&["192.168.1.10/0/0"], false, true).await?;
//! let stream = session
//!     .port(ports[0])
//!     .add_stream(StreamConfig::named("first stream"))
//!     .await?;
//! println!("{}", session.reference(stream)?);
//!
//! session.disconnect(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod chassis;
pub mod error;
pub mod modifier;
pub mod module;
pub mod object;
pub mod port;
pub mod session;
pub mod stream;
pub mod transport;

pub use chassis::{Chassis, TRAFFIC_STATE_TIMEOUT};
pub use error::{XenaError, XenaResult};
pub use modifier::Modifier;
pub use module::{Module, ModuleCapabilities};
pub use object::{
    ChassisHandle, ModifierHandle, ModuleHandle, ObjectData, ObjectId, ObjectTree, PortHandle,
    StreamHandle, XenaObject,
};
pub use port::{Port, PortStats};
pub use session::{Session, SessionConfig, TpldAllocator};
pub use stream::{Stream, StreamConfig, StreamState, StreamStats};
pub use transport::{CliTransport, Target, XenaTransport};

pub use xena_protocol::{
    ModifierAction, ModifierConfig, ModifierRange, ModifierType, ObjectKind, DEFAULT_PORT,
};
