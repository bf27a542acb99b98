//! Module operations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use xena_protocol::value::unquote;
use xena_protocol::{ObjectKind, ParseError};

use crate::error::{parse_number, XenaError, XenaResult};
use crate::object::{ModuleHandle, PortHandle};
use crate::port::strip_address;
use crate::session::Session;

const RESERVED_BY_YOU: &str = "RESERVED_BY_YOU";
const RESERVED_BY_OTHER: &str = "RESERVED_BY_OTHER";

/// Hardware features reported by `m_capabilities`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCapabilities {
    pub can_adv_timing: bool,
    pub can_local_time_adjust: bool,
    pub can_media_config: bool,
    pub requires_multi_image: bool,
    pub is_chimera: bool,
    /// Largest clock adjustment, in parts per million
    pub max_ppm: u32,
}

impl ModuleCapabilities {
    /// Parse the leading fields of an `m_capabilities` reply
    ///
    /// Newer firmware appends fields; they are ignored.
    pub fn from_reply(reply: &str) -> XenaResult<Self> {
        let fields: Vec<&str> = reply.split_whitespace().collect();
        let [adv_timing, local_time, media_config, multi_image, chimera, max_ppm, ..] = fields.as_slice() else {
            return Err(XenaError::Parse(ParseError::FieldCount {
                attribute: "m_capabilities".to_string(),
                expected: 6,
                actual: fields.len(),
                reply: reply.to_string(),
            }));
        };
        let flag = |value: &str| -> XenaResult<bool> { Ok(parse_number::<u32>("m_capabilities", value)? != 0) };
        Ok(Self {
            can_adv_timing: flag(*adv_timing)?,
            can_local_time_adjust: flag(*local_time)?,
            can_media_config: flag(*media_config)?,
            requires_multi_image: flag(*multi_image)?,
            is_chimera: flag(*chimera)?,
            max_ppm: parse_number("m_capabilities", max_ppm)?,
        })
    }
}

/// Module view borrowed from a [`Session`]
pub struct Module<'a> {
    session: &'a mut Session,
    handle: ModuleHandle,
}

impl<'a> Module<'a> {
    pub(crate) fn new(session: &'a mut Session, handle: ModuleHandle) -> Self {
        Self { session, handle }
    }

    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    /// Slot number
    pub fn index(&self) -> XenaResult<u32> {
        let object = self
            .session
            .tree()
            .expect_kind(self.handle.id(), ObjectKind::Module)?;
        object
            .index()
            .ok_or_else(|| XenaError::ObjectNotFound(object.reference().to_string()))
    }

    /// Read module info and discover its ports
    ///
    /// CFP modules report their active port count through `m_cfpconfig`;
    /// other modules through `m_portcount`.
    pub async fn inventory(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        let attributes = self.session.get_attributes(id).await?;

        let cfp_type = match attributes.get("m_cfptype") {
            Some(cfp_type) => cfp_type.clone(),
            None => self.session.get_attribute(id, "m_cfptype").await?,
        };
        let port_count: u32 = if cfp_type.contains("NOTCFP") {
            let count = match attributes.get("m_portcount") {
                Some(count) => count.clone(),
                None => self.session.get_attribute(id, "m_portcount").await?,
            };
            parse_number("m_portcount", &count)?
        } else {
            let cfp_config = self.session.get_attribute(id, "m_cfpconfig").await?;
            let first = cfp_config.split_whitespace().next().unwrap_or_default();
            parse_number("m_cfpconfig", first)?
        };

        debug!("Module {} has {} ports", self.index()?, port_count);
        for index in 0..port_count {
            let port = PortHandle(self.session.ensure_child(id, ObjectKind::Port, index)?);
            self.session.port(port).inventory().await?;
        }
        self.session.tree_mut().set_discovered(id, ObjectKind::Port, true)
    }

    /// Ports of this module, discovered on first use
    pub async fn ports(&mut self) -> XenaResult<BTreeMap<u32, PortHandle>> {
        let id = self.handle.id();
        if !self.session.tree().get(id)?.is_discovered(ObjectKind::Port) {
            self.inventory().await?;
        }
        Ok(self
            .session
            .tree()
            .children_of(id, ObjectKind::Port)?
            .into_iter()
            .map(|(index, port)| (index, PortHandle(port)))
            .collect())
    }

    /// Port `index`, if it is in the tree
    pub fn port(&self, index: u32) -> XenaResult<PortHandle> {
        let id = self.handle.id();
        match self.session.tree().child(id, ObjectKind::Port, index) {
            Some(port) => Ok(PortHandle(port)),
            None => Err(XenaError::ObjectNotFound(format!(
                "{}/port/{}",
                self.session.reference(id)?,
                index
            ))),
        }
    }

    /// Hardware features of the module
    pub async fn capabilities(&mut self) -> XenaResult<ModuleCapabilities> {
        let reply = self.session.get_attribute(self.handle, "m_capabilities").await?;
        ModuleCapabilities::from_reply(&reply)
    }

    /// Reserve the module, taking it from another user only with `force`
    pub async fn reserve(&mut self, force: bool) -> XenaResult<()> {
        let id = self.handle.id();
        let status = self.session.get_attribute(id, "m_reservation").await?;
        match status.as_str() {
            RESERVED_BY_YOU => return Ok(()),
            RESERVED_BY_OTHER if !force => {
                let owner = self.session.get_attribute(id, "m_reservedby").await?;
                return Err(XenaError::ReservedByOther {
                    location: self.session.reference(id)?.to_string(),
                    owner: unquote(&owner).to_string(),
                });
            }
            RESERVED_BY_OTHER => {
                self.session.send_command(id, "m_reservation", &["relinquish"]).await?;
            }
            _ => {}
        }
        self.session.send_command(id, "m_reservation", &["reserve"]).await?;
        info!("Reserved module {}", self.session.reference(id)?);
        Ok(())
    }

    /// Release the module if this session holds it
    pub async fn release(&mut self) -> XenaResult<()> {
        let id = self.handle.id();
        let status = self.session.get_attribute(id, "m_reservation").await?;
        if status == RESERVED_BY_YOU {
            self.session.send_command(id, "m_reservation", &["release"]).await?;
        }
        Ok(())
    }

    /// Configuration of the module and all its ports as replayable lines
    pub async fn config_dump(&mut self) -> XenaResult<Vec<String>> {
        let id = self.handle.id();
        let mut lines = vec![format!(";Module: {}", self.index()?)];

        let config = self
            .session
            .send_command_return_multilines(id, "m_config", &["?"])
            .await?;
        lines.extend(config.iter().map(|line| strip_address(line)));

        for (_, port) in self.ports().await? {
            lines.extend(self.session.port(port).config_dump().await?);
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_reply() {
        let capabilities = ModuleCapabilities::from_reply("1 0 1 0 0 400 12 7").unwrap();
        assert_eq!(
            capabilities,
            ModuleCapabilities {
                can_adv_timing: true,
                can_local_time_adjust: false,
                can_media_config: true,
                requires_multi_image: false,
                is_chimera: false,
                max_ppm: 400,
            }
        );
    }

    #[test]
    fn test_capabilities_short_reply() {
        let err = ModuleCapabilities::from_reply("1 0 1").unwrap_err();
        assert!(matches!(
            err,
            XenaError::Parse(ParseError::FieldCount {
                expected: 6,
                actual: 3,
                ..
            })
        ));
        assert!(ModuleCapabilities::from_reply("1 0 1 0 x 400").is_err());
    }
}
