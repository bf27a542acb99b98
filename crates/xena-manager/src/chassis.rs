//! Chassis operations

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use xena_protocol::value::unquote;
use xena_protocol::{Location, ObjectKind};

use crate::error::{parse_number, XenaError, XenaResult};
use crate::object::{ChassisHandle, ModuleHandle, ObjectId, PortHandle};
use crate::session::Session;

/// How long ports get to report the requested `p_traffic` state after `c_traffic`
pub const TRAFFIC_STATE_TIMEOUT: Duration = Duration::from_secs(40);

/// Chassis view borrowed from a [`Session`]
pub struct Chassis<'a> {
    session: &'a mut Session,
    handle: ChassisHandle,
}

impl<'a> Chassis<'a> {
    pub(crate) fn new(session: &'a mut Session, handle: ChassisHandle) -> Self {
        Self { session, handle }
    }

    pub fn handle(&self) -> ChassisHandle {
        self.handle
    }

    /// Address the chassis was added under
    pub fn address(&self) -> XenaResult<&str> {
        Ok(self
            .session
            .tree()
            .expect_kind(self.handle.id(), ObjectKind::Chassis)?
            .chassis())
    }

    /// Read chassis info and create one module per populated slot
    pub async fn inventory(&mut self, modules_inventory: bool) -> XenaResult<()> {
        let id = self.handle.id();
        let attributes = self.session.get_attributes(id).await?;
        let port_counts = match attributes.get("c_portcounts") {
            Some(counts) => counts.clone(),
            None => self.session.get_attribute(id, "c_portcounts").await?,
        };

        let mut modules = Vec::new();
        for (slot, count) in port_counts.split_whitespace().enumerate() {
            let count: u32 = parse_number("c_portcounts", count)?;
            if count > 0 {
                let module = self.session.ensure_child(id, ObjectKind::Module, slot as u32)?;
                modules.push(ModuleHandle(module));
            }
        }
        self.session.tree_mut().set_discovered(id, ObjectKind::Module, true)?;
        debug!("Chassis {} has {} modules", self.address()?, modules.len());

        if modules_inventory {
            for module in modules {
                self.session.module(module).inventory().await?;
            }
        }
        Ok(())
    }

    /// Modules of this chassis, discovered on first use
    pub async fn modules(&mut self) -> XenaResult<BTreeMap<u32, ModuleHandle>> {
        let id = self.handle.id();
        if !self.session.tree().get(id)?.is_discovered(ObjectKind::Module) {
            self.inventory(false).await?;
        }
        Ok(self
            .session
            .tree()
            .children_of(id, ObjectKind::Module)?
            .into_iter()
            .map(|(index, module)| (index, ModuleHandle(module)))
            .collect())
    }

    /// Module in slot `index`, if it is in the tree
    ///
    /// Nothing is created: modules enter the tree through
    /// [`inventory`](Self::inventory) or a successful reservation.
    pub fn module(&self, index: u32) -> XenaResult<ModuleHandle> {
        let id = self.handle.id();
        match self.session.tree().child(id, ObjectKind::Module, index) {
            Some(module) => Ok(ModuleHandle(module)),
            None => Err(XenaError::ObjectNotFound(format!(
                "{}/module/{}",
                self.session.reference(id)?,
                index
            ))),
        }
    }

    /// Reserve ports of this chassis given as port locations
    ///
    /// Module and port nodes are created as needed. When a reservation fails
    /// the nodes created for it are removed again before the error is
    /// returned.
    pub async fn reserve_ports(
        &mut self,
        locations: &[Location],
        force: bool,
        reset: bool,
    ) -> XenaResult<Vec<PortHandle>> {
        let id = self.handle.id();
        let mut reserved = Vec::with_capacity(locations.len());
        for location in locations {
            let [module_index, port_index] = location.index() else {
                return Err(XenaError::WrongKind {
                    reference: location.to_string(),
                    expected: ObjectKind::Port,
                    actual: location.kind(),
                });
            };

            let module_existed = self.session.tree().child(id, ObjectKind::Module, *module_index);
            let module = self.session.ensure_child(id, ObjectKind::Module, *module_index)?;
            let port_existed = self.session.tree().child(module, ObjectKind::Port, *port_index);
            let port = self.session.ensure_child(module, ObjectKind::Port, *port_index)?;

            if let Err(e) = self.reserve_port(PortHandle(port), force, reset).await {
                let created = match (module_existed, port_existed) {
                    (None, _) => Some(module),
                    (Some(_), None) => Some(port),
                    _ => None,
                };
                self.discard(created);
                return Err(e);
            }
            reserved.push(PortHandle(port));
        }
        Ok(reserved)
    }

    async fn reserve_port(&mut self, port: PortHandle, force: bool, reset: bool) -> XenaResult<()> {
        let mut view = self.session.port(port);
        view.reserve(force).await?;
        if reset {
            view.reset().await?;
        }
        Ok(())
    }

    /// Drop a node created for a failed operation
    fn discard(&mut self, created: Option<ObjectId>) {
        let Some(id) = created else {
            return;
        };
        if let Err(e) = self.session.remove_object(id) {
            warn!("Dropping node after failed reservation failed: {}", e);
        }
    }

    /// Release every port of this chassis held in the tree
    pub async fn release_ports(&mut self) -> XenaResult<()> {
        for port in self.ports()? {
            self.session.port(port).release().await?;
        }
        Ok(())
    }

    /// Reserve modules by slot number
    ///
    /// Like [`reserve_ports`](Self::reserve_ports), a module node created for
    /// a failed reservation is removed again.
    pub async fn reserve_modules(&mut self, indices: &[u32], force: bool) -> XenaResult<Vec<ModuleHandle>> {
        let id = self.handle.id();
        let mut reserved = Vec::with_capacity(indices.len());
        for index in indices {
            let existed = self.session.tree().child(id, ObjectKind::Module, *index);
            let module = self.session.ensure_child(id, ObjectKind::Module, *index)?;
            if let Err(e) = self.session.module(ModuleHandle(module)).reserve(force).await {
                self.discard(existed.is_none().then_some(module));
                return Err(e);
            }
            reserved.push(ModuleHandle(module));
        }
        Ok(reserved)
    }

    /// Release every module of this chassis held in the tree
    pub async fn release_modules(&mut self) -> XenaResult<()> {
        let modules = self.session.tree().children_of(self.handle.id(), ObjectKind::Module)?;
        for (_, module) in modules {
            self.session.module(ModuleHandle(module)).release().await?;
        }
        Ok(())
    }

    fn ports(&self) -> XenaResult<Vec<PortHandle>> {
        let tree = self.session.tree();
        let mut ports = Vec::new();
        for (_, module) in tree.children_of(self.handle.id(), ObjectKind::Module)? {
            for (_, port) in tree.children_of(module, ObjectKind::Port)? {
                ports.push(PortHandle(port));
            }
        }
        Ok(ports)
    }

    /// Start traffic on `ports` of this chassis in one command
    ///
    /// An empty slice means every port of this chassis in the tree. Returns
    /// once every port reports traffic on, or, with `blocking`, once the
    /// traffic has ended on all of them.
    pub async fn start_traffic(&mut self, ports: &[PortHandle], blocking: bool) -> XenaResult<()> {
        let ports = self.operation_ports(ports)?;
        self.traffic(&ports, true).await?;
        if blocking {
            self.wait_traffic(&ports).await?;
        }
        Ok(())
    }

    /// Stop traffic on `ports` of this chassis in one command
    ///
    /// An empty slice means every port of this chassis in the tree.
    pub async fn stop_traffic(&mut self, ports: &[PortHandle]) -> XenaResult<()> {
        let ports = self.operation_ports(ports)?;
        self.traffic(&ports, false).await
    }

    /// Wait, without a deadline, until traffic has stopped on `ports`
    ///
    /// An empty slice means every port of this chassis in the tree.
    pub async fn wait_traffic(&mut self, ports: &[PortHandle]) -> XenaResult<()> {
        for port in self.operation_ports(ports)? {
            self.session.port(port).wait_for_traffic(false, None).await?;
        }
        Ok(())
    }

    fn operation_ports(&self, ports: &[PortHandle]) -> XenaResult<Vec<PortHandle>> {
        if ports.is_empty() {
            self.ports()
        } else {
            Ok(ports.to_vec())
        }
    }

    /// `c_traffic on|off m p ...`, then wait for every port to follow
    async fn traffic(&mut self, ports: &[PortHandle], on: bool) -> XenaResult<()> {
        let mut args = vec![if on { "on" } else { "off" }.to_string()];
        for port in ports {
            let location = self
                .session
                .tree()
                .expect_kind(port.id(), ObjectKind::Port)?
                .location()
                .clone();
            args.extend(location.index().iter().map(|i| i.to_string()));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.session.send_command(self.handle, "c_traffic", &args).await?;

        for port in ports {
            self.session
                .port(*port)
                .wait_for_traffic(on, Some(TRAFFIC_STATE_TIMEOUT))
                .await?;
        }
        debug!("Traffic {} on {} ports of {}", args[0], ports.len(), self.address()?);
        Ok(())
    }

    /// Configuration of the chassis and all its modules as replayable lines
    pub async fn config_dump(&mut self) -> XenaResult<Vec<String>> {
        let id = self.handle.id();
        let name = self.session.get_attribute(id, "c_name").await?;
        let mut lines = vec![format!(";Chassis: {}", unquote(&name))];

        let config = self
            .session
            .send_command_return_multilines(id, "c_config", &["?"])
            .await?;
        lines.extend(config.iter().map(|line| line.trim().to_string()));

        for (_, module) in self.modules().await? {
            lines.extend(self.session.module(module).config_dump().await?);
        }
        Ok(lines)
    }

    /// Write [`config_dump`](Self::config_dump) to `path`
    pub async fn save_config(&mut self, path: &Path) -> XenaResult<()> {
        let lines = self.config_dump().await?;
        tokio::fs::write(path, lines.join("\n") + "\n").await?;
        info!("Saved chassis {} config to {}", self.address()?, path.display());
        Ok(())
    }
}
