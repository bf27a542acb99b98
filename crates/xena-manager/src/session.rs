//! Scripting session
//!
//! A [`Session`] is the root of the object tree. It owns the arena, the
//! transport and the TPLD allocator, and exposes the generic attribute
//! operations every object kind shares. Kind-specific operations live on
//! short-lived views borrowed from the session, e.g.
//! `session.port(handle).reserve(false)`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use xena_channel::config::{DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use xena_protocol::{split_port_location, ObjectKind};
use xena_sim::VirtualChassisConfig;

use crate::chassis::Chassis;
use crate::error::{XenaError, XenaResult};
use crate::modifier::Modifier;
use crate::module::Module;
use crate::object::{
    ChassisHandle, ModifierHandle, ModuleHandle, ObjectId, ObjectTree, PortHandle, StreamHandle,
    XenaObject,
};
use crate::port::{Port, PortStats};
use crate::stream::Stream;
use crate::transport::{CliTransport, Target, XenaTransport};

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Owner name claimed on every chassis
    pub owner: String,
    /// Connect and read timeout in milliseconds
    pub timeout_ms: u64,
    /// Keepalive period in milliseconds; zero disables keepalives
    pub keepalive_interval_ms: u64,
    /// Use in-memory virtual chassis instead of TCP
    pub dummy: bool,
    /// Virtual chassis layout used in dummy mode
    pub virtual_chassis: VirtualChassisConfig,
}

impl SessionConfig {
    /// Keepalive period, if enabled
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            owner: "xena-manager".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            dummy: false,
            virtual_chassis: VirtualChassisConfig::default(),
        }
    }
}

/// Session-scoped allocator of stream TPLD ids
///
/// Ids only grow. Explicitly requested ids and ids seen during discovery
/// push the counter past them so automatic ids never collide. The counter
/// saturates at `u32::MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpldAllocator {
    next: u32,
}

impl TpldAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `requested`, or the next free id when `None`
    pub fn allocate(&mut self, requested: Option<u32>) -> u32 {
        let id = requested.unwrap_or(self.next);
        self.next = self.next.saturating_add(1).max(id.saturating_add(1));
        id
    }

    /// Account for an id already in use on the device
    pub fn observe(&mut self, id: u32) {
        self.next = self.next.max(id.saturating_add(1));
    }

    /// Id the next automatic allocation would return
    pub fn next_tpld_id(&self) -> u32 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Root of the object tree
pub struct Session {
    config: SessionConfig,
    transport: Arc<dyn XenaTransport>,
    tree: ObjectTree,
    tpld: TpldAllocator,
}

impl Session {
    /// Create a session over any transport
    pub fn new(config: SessionConfig, transport: Arc<dyn XenaTransport>) -> Self {
        let tree = ObjectTree::new(&config.owner);
        Self {
            config,
            transport,
            tree,
            tpld: TpldAllocator::new(),
        }
    }

    /// Create a session over the chassis CLI, honouring dummy mode
    pub fn cli(config: SessionConfig) -> Self {
        let keepalive = config.keepalive_interval();
        let transport = if config.dummy {
            CliTransport::dummy(config.virtual_chassis.clone(), keepalive)
        } else {
            CliTransport::new(config.timeout_ms, keepalive)
        };
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn owner(&self) -> &str {
        &self.config.owner
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ObjectTree {
        &mut self.tree
    }

    pub fn transport(&self) -> &Arc<dyn XenaTransport> {
        &self.transport
    }

    pub fn tpld(&self) -> &TpldAllocator {
        &self.tpld
    }

    pub(crate) fn tpld_mut(&mut self) -> &mut TpldAllocator {
        &mut self.tpld
    }

    /// Id the next automatically numbered stream will get
    pub fn next_tpld_id(&self) -> u32 {
        self.tpld.next_tpld_id()
    }

    /// Restart automatic TPLD numbering from zero
    pub fn reset_tpld_ids(&mut self) {
        self.tpld.reset();
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn chassis(&mut self, handle: ChassisHandle) -> Chassis<'_> {
        Chassis::new(self, handle)
    }

    pub fn module(&mut self, handle: ModuleHandle) -> Module<'_> {
        Module::new(self, handle)
    }

    pub fn port(&mut self, handle: PortHandle) -> Port<'_> {
        Port::new(self, handle)
    }

    pub fn stream(&mut self, handle: StreamHandle) -> Stream<'_> {
        Stream::new(self, handle)
    }

    pub fn modifier(&mut self, handle: ModifierHandle) -> Modifier<'_> {
        Modifier::new(self, handle)
    }

    // ------------------------------------------------------------------
    // Generic object operations
    // ------------------------------------------------------------------

    pub fn object(&self, object: impl Into<ObjectId>) -> XenaResult<&XenaObject> {
        self.tree.get(object.into())
    }

    /// Full reference of an object
    pub fn reference(&self, object: impl Into<ObjectId>) -> XenaResult<&str> {
        Ok(self.tree.get(object.into())?.reference())
    }

    /// Parent of an object; `None` for the session root
    pub fn parent(&self, object: impl Into<ObjectId>) -> XenaResult<Option<ObjectId>> {
        Ok(self.tree.get(object.into())?.parent())
    }

    /// Last value read or written for `attribute`, without touching the wire
    pub fn cached_attribute(&self, object: impl Into<ObjectId>, attribute: &str) -> Option<&str> {
        self.tree
            .get(object.into())
            .ok()?
            .attributes()
            .get(&attribute.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Forget an object and its subtree locally
    pub fn remove_object(&mut self, object: impl Into<ObjectId>) -> XenaResult<()> {
        self.tree.remove(object.into())
    }

    pub(crate) fn target(&self, id: ObjectId) -> XenaResult<Target> {
        let object = self.tree.get(id)?;
        if object.kind() == ObjectKind::Session {
            return Err(XenaError::WrongKind {
                reference: object.reference().to_string(),
                expected: ObjectKind::Chassis,
                actual: ObjectKind::Session,
            });
        }
        Ok(Target::new(object.chassis(), object.location().clone()))
    }

    /// Read an attribute from the device and cache it
    pub async fn get_attribute(&mut self, object: impl Into<ObjectId>, attribute: &str) -> XenaResult<String> {
        let id = object.into();
        let target = self.target(id)?;
        let value = self.transport.get_attribute(&target, attribute).await?;
        self.tree.cache_attribute(id, attribute, &value)?;
        Ok(value)
    }

    /// Write an attribute; the cache only changes when the device accepts it
    pub async fn set_attribute(
        &mut self,
        object: impl Into<ObjectId>,
        attribute: &str,
        value: &str,
    ) -> XenaResult<()> {
        let id = object.into();
        let target = self.target(id)?;
        self.transport.set_attribute(&target, attribute, value).await?;
        self.tree.cache_attribute(id, attribute, value)
    }

    /// Write several attributes in order, stopping at the first rejection
    pub async fn set_attributes(
        &mut self,
        object: impl Into<ObjectId>,
        attributes: &[(&str, &str)],
    ) -> XenaResult<()> {
        let id = object.into();
        for (attribute, value) in attributes {
            self.set_attribute(id, attribute, value).await?;
        }
        Ok(())
    }

    /// Read the bulk info/config snapshot of an object and cache every value
    pub async fn get_attributes(&mut self, object: impl Into<ObjectId>) -> XenaResult<BTreeMap<String, String>> {
        let id = object.into();
        let target = self.target(id)?;
        let attributes = self.transport.get_attributes(&target).await?;
        for (name, value) in &attributes {
            self.tree.cache_attribute(id, name, value)?;
        }
        Ok(attributes)
    }

    /// Send a verified command addressed to an object
    pub async fn send_command(
        &mut self,
        object: impl Into<ObjectId>,
        command: &str,
        args: &[&str],
    ) -> XenaResult<()> {
        let target = self.target(object.into())?;
        self.transport.send_command(&target, command, args).await
    }

    /// Send a query addressed to an object and return the stripped reply
    pub async fn send_command_return(
        &mut self,
        object: impl Into<ObjectId>,
        command: &str,
        args: &[&str],
    ) -> XenaResult<String> {
        let target = self.target(object.into())?;
        self.transport.send_command_return(&target, command, args).await
    }

    /// Send a multi-reply query addressed to an object
    pub async fn send_command_return_multilines(
        &mut self,
        object: impl Into<ObjectId>,
        command: &str,
        args: &[&str],
    ) -> XenaResult<Vec<String>> {
        let target = self.target(object.into())?;
        self.transport
            .send_command_return_multilines(&target, command, args)
            .await
    }

    /// Existing child node, or a new one
    pub(crate) fn ensure_child(&mut self, parent: ObjectId, kind: ObjectKind, index: u32) -> XenaResult<ObjectId> {
        match self.tree.child(parent, kind, index) {
            Some(id) => Ok(id),
            None => self.tree.insert_indexed(parent, kind, index),
        }
    }

    // ------------------------------------------------------------------
    // Session-wide operations
    // ------------------------------------------------------------------

    /// Connect, log on and claim a chassis
    ///
    /// Adding an address twice returns the existing chassis. When the
    /// handshake fails the node is removed again.
    pub async fn add_chassis(&mut self, address: &str, port: u16, password: &str) -> XenaResult<ChassisHandle> {
        if let Some(id) = self.tree.chassis(address) {
            return Ok(ChassisHandle(id));
        }

        let id = self.tree.insert_chassis(address, port)?;
        let owner = self.config.owner.clone();
        if let Err(e) = self
            .transport
            .add_chassis(address, port, password, &owner)
            .await
        {
            self.tree.remove(id)?;
            return Err(e);
        }

        info!("Session {} added chassis {}", owner, address);
        Ok(ChassisHandle(id))
    }

    /// Disconnect a chassis and drop its subtree
    pub async fn remove_chassis(&mut self, chassis: ChassisHandle) -> XenaResult<()> {
        let address = self
            .tree
            .expect_kind(chassis.id(), ObjectKind::Chassis)?
            .chassis()
            .to_string();
        self.transport.remove_chassis(&address).await?;
        self.tree.remove(chassis.id())
    }

    /// Chassis added to the session, keyed by address
    pub fn chassis_list(&self) -> BTreeMap<String, ChassisHandle> {
        self.tree
            .chassis_children()
            .into_iter()
            .map(|(address, id)| (address, ChassisHandle(id)))
            .collect()
    }

    /// Chassis added under `address`
    pub fn find_chassis(&self, address: &str) -> XenaResult<ChassisHandle> {
        self.tree
            .chassis(address)
            .map(ChassisHandle)
            .ok_or_else(|| XenaError::UnknownChassis(address.to_string()))
    }

    /// Discover every chassis down to its ports
    pub async fn inventory(&mut self) -> XenaResult<()> {
        for (_, chassis) in self.chassis_list() {
            self.chassis(chassis).inventory(true).await?;
        }
        Ok(())
    }

    /// Ports currently in the tree, keyed by `ip/module/port`
    pub fn ports(&self) -> BTreeMap<String, PortHandle> {
        self.tree
            .objects_of_kind(ObjectKind::Port)
            .into_iter()
            .map(|port| {
                (
                    format!("{}/{}", port.chassis(), port.location()),
                    PortHandle(port.id()),
                )
            })
            .collect()
    }

    /// Reserve ports given as `ip/module/port`, optionally resetting them
    ///
    /// Every chassis must already be added.
    pub async fn reserve_ports(&mut self, locations: &[&str], force: bool, reset: bool) -> XenaResult<Vec<PortHandle>> {
        let mut per_chassis: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for text in locations {
            let (address, location) = split_port_location(text)?;
            per_chassis.entry(address).or_default().push(location);
        }

        let mut reserved = Vec::new();
        for (address, locations) in per_chassis {
            let chassis = self.find_chassis(&address)?;
            reserved.extend(
                self.chassis(chassis)
                    .reserve_ports(&locations, force, reset)
                    .await?,
            );
        }
        Ok(reserved)
    }

    /// Release every port in the tree
    pub async fn release_ports(&mut self) -> XenaResult<()> {
        for (_, port) in self.ports() {
            self.port(port).release().await?;
        }
        Ok(())
    }

    /// Release every module in the tree
    pub async fn release_modules(&mut self) -> XenaResult<()> {
        for (_, chassis) in self.chassis_list() {
            self.chassis(chassis).release_modules().await?;
        }
        Ok(())
    }

    /// Start traffic on `ports`, or on every port in the tree when empty
    ///
    /// With `blocking` the call returns once the traffic has ended.
    pub async fn start_traffic(&mut self, ports: &[PortHandle], blocking: bool) -> XenaResult<()> {
        let per_chassis = self.per_chassis(ports)?;
        for (chassis, ports) in &per_chassis {
            self.chassis(*chassis).start_traffic(ports, false).await?;
        }
        if blocking {
            for (chassis, ports) in &per_chassis {
                self.chassis(*chassis).wait_traffic(ports).await?;
            }
        }
        Ok(())
    }

    /// Stop traffic on `ports`, or on every port in the tree when empty
    pub async fn stop_traffic(&mut self, ports: &[PortHandle]) -> XenaResult<()> {
        for (chassis, ports) in self.per_chassis(ports)? {
            self.chassis(chassis).stop_traffic(&ports).await?;
        }
        Ok(())
    }

    /// Wait until traffic has stopped on `ports`, or on every port when empty
    pub async fn wait_traffic(&mut self, ports: &[PortHandle]) -> XenaResult<()> {
        for (chassis, ports) in self.per_chassis(ports)? {
            self.chassis(chassis).wait_traffic(&ports).await?;
        }
        Ok(())
    }

    /// Zero the counters of `ports`, or of every port when empty
    pub async fn clear_stats(&mut self, ports: &[PortHandle]) -> XenaResult<()> {
        for port in self.operation_ports(ports) {
            self.port(port).clear_stats().await?;
        }
        Ok(())
    }

    /// Totals of `ports`, or of every port when empty, keyed by `ip/module/port`
    pub async fn read_stats(&mut self, ports: &[PortHandle]) -> XenaResult<BTreeMap<String, PortStats>> {
        let mut stats = BTreeMap::new();
        for port in self.operation_ports(ports) {
            let object = self.tree.expect_kind(port.id(), ObjectKind::Port)?;
            let name = format!("{}/{}", object.chassis(), object.location());
            stats.insert(name, self.port(port).read_stats().await?);
        }
        Ok(stats)
    }

    fn operation_ports(&self, ports: &[PortHandle]) -> Vec<PortHandle> {
        if ports.is_empty() {
            self.ports().into_values().collect()
        } else {
            ports.to_vec()
        }
    }

    /// Group ports by the chassis they belong to
    fn per_chassis(&self, ports: &[PortHandle]) -> XenaResult<BTreeMap<ChassisHandle, Vec<PortHandle>>> {
        let mut per_chassis: BTreeMap<ChassisHandle, Vec<PortHandle>> = BTreeMap::new();
        for port in self.operation_ports(ports) {
            let address = self.tree.expect_kind(port.id(), ObjectKind::Port)?.chassis();
            let chassis = self.find_chassis(address)?;
            per_chassis.entry(chassis).or_default().push(port);
        }
        Ok(per_chassis)
    }

    /// Drop every chassis, optionally releasing reserved ports first
    pub async fn disconnect(&mut self, release: bool) -> XenaResult<()> {
        if release {
            if let Err(e) = self.release_ports().await {
                warn!("Releasing ports before disconnect failed: {}", e);
            }
        }
        self.transport.disconnect().await;
        for (address, id) in self.tree.chassis_children() {
            debug!("Dropping chassis {}", address);
            self.tree.remove(id)?;
        }
        info!("Session {} disconnected", self.config.owner);
        Ok(())
    }
}
