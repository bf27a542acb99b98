//! Virtual chassis for testing
//!
//! This module provides a simulated chassis that answers protocol command
//! lines with the same echo format, sentinels and error replies as real
//! hardware. It backs dummy mode and the integration tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use xena_protocol::value::{quote, unquote};
use xena_protocol::{Location, ObjectKind, REPLY_OK, SYNC_COMMAND, SYNC_REPLY};

use crate::port::{apply_reservation, generic_attribute, reservation_status, PortContext, VirtualPort};
use crate::request::{PortSelector, Request};
use crate::{
    OTHER_OWNER, REPLY_BAD_MODULE, REPLY_BAD_PASSWORD, REPLY_BAD_PORT, REPLY_BAD_VALUE,
    REPLY_NOT_LOGGED_ON, REPLY_NOT_RESERVED, REPLY_SYNTAX_ERROR,
};

/// Configuration of one simulated module slot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualModuleConfig {
    /// Model name reported by `M_MODEL`
    pub model: String,
    /// Number of ports; zero models an empty slot
    pub port_count: u32,
    /// Port speed in Mbit/s
    pub port_speed: u32,
    /// Report a CFP cage so the port count comes from `M_CFPCONFIG`
    pub cfp: bool,
    /// Whether `PS_MODIFIEREXT*` commands are accepted
    pub extended_modifiers: bool,
    /// Ports already reserved by another user
    pub reserved_by_other: Vec<u32>,
}

impl Default for VirtualModuleConfig {
    fn default() -> Self {
        Self {
            model: "Odin-1G-3S-6P".to_string(),
            port_count: 2,
            port_speed: 1000,
            cfp: false,
            extended_modifiers: false,
            reserved_by_other: Vec::new(),
        }
    }
}

impl VirtualModuleConfig {
    /// Empty module slot
    pub fn empty() -> Self {
        Self {
            model: String::new(),
            port_count: 0,
            ..Self::default()
        }
    }
}

/// Configuration for creating a virtual chassis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualChassisConfig {
    /// Chassis name reported by `C_NAME`
    pub name: String,
    /// Model reported by `C_MODEL`
    pub model: String,
    /// Serial number reported by `C_SERIALNO`
    pub serial: String,
    /// Logon password
    pub password: String,
    /// Module slots, in slot order
    pub modules: Vec<VirtualModuleConfig>,
}

impl Default for VirtualChassisConfig {
    fn default() -> Self {
        Self {
            name: "Virtual Chassis".to_string(),
            model: "XenaBay".to_string(),
            serial: "0".to_string(),
            password: "xena".to_string(),
            modules: vec![VirtualModuleConfig::default(), VirtualModuleConfig::empty()],
        }
    }
}

#[derive(Debug, Clone)]
struct VirtualModule {
    model: String,
    cfp: bool,
    extended_modifiers: bool,
    reserved_by: Option<String>,
    attributes: BTreeMap<String, String>,
    ports: Vec<VirtualPort>,
}

impl VirtualModule {
    fn from_config(config: &VirtualModuleConfig) -> Self {
        let ports = (0..config.port_count)
            .map(|p| {
                let reserved_by = config
                    .reserved_by_other
                    .contains(&p)
                    .then(|| OTHER_OWNER.to_string());
                VirtualPort::new(reserved_by, config.port_speed)
            })
            .collect();

        let mut attributes = BTreeMap::new();
        attributes.insert("M_COMMENT".to_string(), quote(""));

        Self {
            model: config.model.clone(),
            cfp: config.cfp,
            extended_modifiers: config.extended_modifiers,
            reserved_by: None,
            attributes,
            ports,
        }
    }
}

/// Virtual chassis
///
/// Holds the whole chassis state and turns each received command line into
/// zero or more reply lines.
pub struct VirtualChassis {
    /// Identifier for logging
    id: String,
    name: String,
    model: String,
    serial: String,
    password: String,
    logged_on: bool,
    owner: String,
    keepalives: u64,
    attributes: BTreeMap<String, String>,
    modules: Vec<VirtualModule>,
    /// Commands received (for test verification)
    received_commands: Vec<String>,
}

impl VirtualChassis {
    /// Create a virtual chassis from configuration
    pub fn from_config(id: impl Into<String>, config: &VirtualChassisConfig) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("C_NAME".to_string(), quote(&config.name));
        attributes.insert("C_COMMENT".to_string(), quote(""));

        Self {
            id: id.into(),
            name: config.name.clone(),
            model: config.model.clone(),
            serial: config.serial.clone(),
            password: config.password.clone(),
            logged_on: false,
            owner: String::new(),
            keepalives: 0,
            attributes,
            modules: config.modules.iter().map(VirtualModule::from_config).collect(),
            received_commands: Vec::new(),
        }
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chassis name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner set by the last `C_OWNER`
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Number of keepalive queries answered
    pub fn keepalives(&self) -> u64 {
        self.keepalives
    }

    /// Get all received command lines
    pub fn received_commands(&self) -> &[String] {
        &self.received_commands
    }

    /// Process one command line and return the reply lines
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        self.received_commands.push(line.to_string());

        let Some(req) = Request::parse(line) else {
            debug!("Virtual chassis {} cannot parse {:?}", self.id, line);
            return vec![REPLY_SYNTAX_ERROR.to_string()];
        };

        if req.module.is_none() && req.command == SYNC_COMMAND {
            return vec![SYNC_REPLY.to_string()];
        }

        if !self.logged_on && !matches!(req.command.as_str(), "C_LOGON" | "C_KEEPALIVE") {
            return vec![REPLY_NOT_LOGGED_ON.to_string()];
        }

        let replies = match (req.module, req.port) {
            (None, _) => self.handle_chassis(&req),
            (Some(m), None) => self.handle_module(m, &req),
            (Some(m), Some(PortSelector::One(p))) => self.handle_port(m, p, &req),
            (Some(m), Some(PortSelector::All)) => match self.modules.get(m as usize) {
                Some(module) => {
                    let count = module.ports.len() as u32;
                    let mut replies = Vec::new();
                    for p in 0..count {
                        replies.extend(self.handle_port(m, p, &req));
                    }
                    replies
                }
                None => vec![REPLY_BAD_MODULE.to_string()],
            },
        };

        trace!("Virtual chassis {} {:?} -> {:?}", self.id, line, replies);
        replies
    }

    fn handle_chassis(&mut self, req: &Request<'_>) -> Vec<String> {
        let location = Location::chassis();
        let command = req.command.as_str();

        match command {
            "C_LOGON" => {
                if unquote(req.args) == self.password {
                    self.logged_on = true;
                    vec![REPLY_OK.to_string()]
                } else {
                    vec![REPLY_BAD_PASSWORD.to_string()]
                }
            }
            "C_OWNER" => {
                if req.is_query() {
                    vec![location.echo(command, &quote(&self.owner))]
                } else {
                    self.owner = unquote(req.args).to_string();
                    vec![REPLY_OK.to_string()]
                }
            }
            "C_KEEPALIVE" if req.is_query() => {
                self.keepalives += 1;
                vec![location.echo(command, &self.keepalives.to_string())]
            }
            "C_MODEL" if req.is_query() => vec![location.echo(command, &quote(&self.model))],
            "C_SERIALNO" if req.is_query() => vec![location.echo(command, &self.serial)],
            "C_PORTCOUNTS" if req.is_query() => vec![location.echo(command, &self.port_counts())],
            "C_INFO" if req.is_query() => vec![
                location.echo("C_MODEL", &quote(&self.model)),
                location.echo("C_SERIALNO", &self.serial),
                location.echo("C_VERSIONNO", "1 1"),
                location.echo("C_PORTCOUNTS", &self.port_counts()),
            ],
            "C_CONFIG" if req.is_query() => self
                .attributes
                .iter()
                .map(|(k, v)| location.echo(k, v))
                .collect(),
            "C_TRAFFIC" if !req.is_query() => vec![self.chassis_traffic(req.args).to_string()],
            _ if command.starts_with("C_") => {
                generic_attribute(&location, &mut self.attributes, req)
            }
            _ => vec![REPLY_SYNTAX_ERROR.to_string()],
        }
    }

    fn port_counts(&self) -> String {
        self.modules
            .iter()
            .map(|m| m.ports.len().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `C_TRAFFIC on|off m p [m p ...]`
    fn chassis_traffic(&mut self, args: &str) -> &'static str {
        let mut tokens = args.split_whitespace();
        let on = match tokens.next().map(|t| t.to_ascii_uppercase()).as_deref() {
            Some("ON") => true,
            Some("OFF") => false,
            _ => return REPLY_BAD_VALUE,
        };

        let mut targets = Vec::new();
        let numbers: Result<Vec<usize>, _> = tokens.map(|t| t.parse::<usize>()).collect();
        let Ok(numbers) = numbers else {
            return REPLY_BAD_VALUE;
        };
        if numbers.len() % 2 != 0 {
            return REPLY_BAD_VALUE;
        }
        for pair in numbers.chunks(2) {
            let Some(module) = self.modules.get(pair[0]) else {
                return REPLY_BAD_MODULE;
            };
            let Some(port) = module.ports.get(pair[1]) else {
                return REPLY_BAD_PORT;
            };
            if !port.is_reserved_by(&self.owner) {
                return REPLY_NOT_RESERVED;
            }
            targets.push((pair[0], pair[1]));
        }

        for (m, p) in targets {
            if let Some(port) = self.modules.get_mut(m).and_then(|module| module.ports.get_mut(p)) {
                port.set_traffic(on);
            }
        }
        REPLY_OK
    }

    fn handle_module(&mut self, m: u32, req: &Request<'_>) -> Vec<String> {
        let owner = self.owner.clone();
        let Some(module) = self.modules.get_mut(m as usize) else {
            return vec![REPLY_BAD_MODULE.to_string()];
        };
        let location = Location::new(ObjectKind::Module, vec![m]);
        let command = req.command.as_str();
        let cfp_type = if module.cfp { "CFP4" } else { "NOTCFP" };

        match command {
            "M_MODEL" if req.is_query() => vec![location.echo(command, &quote(&module.model))],
            "M_PORTCOUNT" if req.is_query() => {
                vec![location.echo(command, &module.ports.len().to_string())]
            }
            "M_CFPTYPE" if req.is_query() => vec![location.echo(command, cfp_type)],
            "M_CAPABILITIES" if req.is_query() => {
                let value = format!("0 1 {} 0 0 400", u8::from(module.cfp));
                vec![location.echo(command, &value)]
            }
            "M_CFPCONFIG" if req.is_query() => {
                if module.cfp {
                    let value = format!("{} 100", module.ports.len());
                    vec![location.echo(command, &value)]
                } else {
                    vec![REPLY_SYNTAX_ERROR.to_string()]
                }
            }
            "M_INFO" if req.is_query() => vec![
                location.echo("M_MODEL", &quote(&module.model)),
                location.echo("M_SERIALNO", &m.to_string()),
                location.echo("M_VERSIONNO", "1"),
                location.echo("M_CFPTYPE", cfp_type),
            ],
            "M_CONFIG" if req.is_query() => module
                .attributes
                .iter()
                .map(|(k, v)| location.echo(k, v))
                .collect(),
            "M_RESERVATION" => {
                if req.is_query() {
                    let status = reservation_status(module.reserved_by.as_deref(), &owner);
                    vec![location.echo(command, status)]
                } else {
                    vec![apply_reservation(&mut module.reserved_by, &owner, req.args).to_string()]
                }
            }
            "M_RESERVEDBY" if req.is_query() => {
                let reserved_by = module.reserved_by.clone().unwrap_or_default();
                vec![location.echo(command, &quote(&reserved_by))]
            }
            _ if !command.starts_with("M_") => vec![REPLY_SYNTAX_ERROR.to_string()],
            _ if req.is_query() => generic_attribute(&location, &mut module.attributes, req),
            _ if module.reserved_by.as_deref() != Some(owner.as_str()) => {
                vec![REPLY_NOT_RESERVED.to_string()]
            }
            _ => generic_attribute(&location, &mut module.attributes, req),
        }
    }

    fn handle_port(&mut self, m: u32, p: u32, req: &Request<'_>) -> Vec<String> {
        let Some(module) = self.modules.get_mut(m as usize) else {
            return vec![REPLY_BAD_MODULE.to_string()];
        };
        let extended_modifiers = module.extended_modifiers;
        let Some(port) = module.ports.get_mut(p as usize) else {
            return vec![REPLY_BAD_PORT.to_string()];
        };

        let ctx = PortContext {
            location: Location::new(ObjectKind::Port, vec![m, p]),
            owner: &self.owner,
            extended_modifiers,
        };
        port.handle(&ctx, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_on() -> VirtualChassis {
        let mut chassis = VirtualChassis::from_config("test", &VirtualChassisConfig::default());
        assert_eq!(chassis.handle_line("c_logon \"xena\""), vec![REPLY_OK]);
        assert_eq!(chassis.handle_line("c_owner \"tester\""), vec![REPLY_OK]);
        chassis
    }

    #[test]
    fn test_logon_required() {
        let mut chassis = VirtualChassis::from_config("test", &VirtualChassisConfig::default());

        assert_eq!(chassis.handle_line("c_portcounts ?"), vec![REPLY_NOT_LOGGED_ON]);
        assert_eq!(chassis.handle_line("c_logon \"wrong\""), vec![REPLY_BAD_PASSWORD]);
        assert_eq!(chassis.handle_line("SYNC"), vec![SYNC_REPLY]);
        assert_eq!(chassis.handle_line("c_logon \"xena\""), vec![REPLY_OK]);
        assert_eq!(chassis.handle_line("c_portcounts ?"), vec!["C_PORTCOUNTS 2 0"]);
    }

    #[test]
    fn test_owner_and_keepalive() {
        let mut chassis = logged_on();

        assert_eq!(chassis.owner(), "tester");
        assert_eq!(chassis.handle_line("c_owner ?"), vec!["C_OWNER \"tester\""]);
        assert_eq!(chassis.handle_line("C_KEEPALIVE ?"), vec!["C_KEEPALIVE 1"]);
        assert_eq!(chassis.keepalives(), 1);
    }

    #[test]
    fn test_chassis_info_lines() {
        let mut chassis = logged_on();

        let info = chassis.handle_line("c_info ?");
        assert_eq!(info.len(), 4);
        assert!(info.contains(&"C_PORTCOUNTS 2 0".to_string()));
        assert_eq!(
            chassis.handle_line("c_config ?"),
            vec!["C_COMMENT \"\"", "C_NAME \"Virtual Chassis\""]
        );
    }

    #[test]
    fn test_unknown_command_is_syntax_error() {
        let mut chassis = logged_on();

        assert_eq!(chassis.handle_line("c_bogus ?"), vec![REPLY_SYNTAX_ERROR]);
        assert_eq!(chassis.handle_line("0 x_bogus ?"), vec![REPLY_SYNTAX_ERROR]);
        assert_eq!(chassis.handle_line("0/0 q_bogus ?"), vec![REPLY_SYNTAX_ERROR]);
        assert_eq!(chassis.handle_line("0/0/0/0 p_speed ?"), vec![REPLY_SYNTAX_ERROR]);
    }

    #[test]
    fn test_module_queries() {
        let mut chassis = logged_on();

        assert_eq!(chassis.handle_line("0 m_portcount ?"), vec!["0 M_PORTCOUNT 2"]);
        assert_eq!(chassis.handle_line("0 m_cfptype ?"), vec!["0 M_CFPTYPE NOTCFP"]);
        assert_eq!(chassis.handle_line("1 m_portcount ?"), vec!["1 M_PORTCOUNT 0"]);
        assert_eq!(chassis.handle_line("5 m_portcount ?"), vec![REPLY_BAD_MODULE]);
        assert_eq!(chassis.handle_line("0 m_cfpconfig ?"), vec![REPLY_SYNTAX_ERROR]);
        assert_eq!(chassis.handle_line("0 m_capabilities ?"), vec!["0 M_CAPABILITIES 0 1 0 0 0 400"]);
    }

    #[test]
    fn test_cfp_module() {
        let config = VirtualChassisConfig {
            modules: vec![VirtualModuleConfig {
                cfp: true,
                port_count: 4,
                ..VirtualModuleConfig::default()
            }],
            ..VirtualChassisConfig::default()
        };
        let mut chassis = VirtualChassis::from_config("cfp", &config);
        chassis.handle_line("c_logon \"xena\"");

        assert_eq!(chassis.handle_line("0 m_cfptype ?"), vec!["0 M_CFPTYPE CFP4"]);
        assert_eq!(chassis.handle_line("0 m_cfpconfig ?"), vec!["0 M_CFPCONFIG 4 100"]);
    }

    #[test]
    fn test_port_wildcard() {
        let config = VirtualChassisConfig {
            modules: vec![
                VirtualModuleConfig {
                    port_count: 4,
                    ..VirtualModuleConfig::default()
                },
                VirtualModuleConfig::empty(),
            ],
            ..VirtualChassisConfig::default()
        };
        let mut chassis = VirtualChassis::from_config("wild", &config);
        chassis.handle_line("c_logon \"xena\"");

        let replies = chassis.handle_line("0/* p_speed ?");
        assert_eq!(
            replies,
            vec!["0/0 P_SPEED 1000", "0/1 P_SPEED 1000", "0/2 P_SPEED 1000", "0/3 P_SPEED 1000"]
        );
        assert!(chassis.handle_line("1/* p_speed ?").is_empty());
    }

    #[test]
    fn test_module_reservation() {
        let mut chassis = logged_on();

        assert_eq!(chassis.handle_line("0 m_comment \"x\""), vec![REPLY_NOT_RESERVED]);
        assert_eq!(chassis.handle_line("0 m_reservation reserve"), vec![REPLY_OK]);
        assert_eq!(
            chassis.handle_line("0 m_reservation ?"),
            vec!["0 M_RESERVATION RESERVED_BY_YOU"]
        );
        assert_eq!(chassis.handle_line("0 m_comment \"x\""), vec![REPLY_OK]);
        assert_eq!(chassis.handle_line("0 m_config ?"), vec!["0 M_COMMENT \"x\""]);
    }

    #[test]
    fn test_chassis_traffic() {
        let mut chassis = logged_on();

        assert_eq!(chassis.handle_line("c_traffic on 0 1"), vec![REPLY_NOT_RESERVED]);
        chassis.handle_line("0/1 p_reservation reserve");
        assert_eq!(chassis.handle_line("c_traffic on 0 1"), vec![REPLY_OK]);
        assert_eq!(chassis.handle_line("0/1 p_traffic ?"), vec!["0/1 P_TRAFFIC ON"]);
        assert_eq!(chassis.handle_line("c_traffic off 0 1"), vec![REPLY_OK]);
        assert_eq!(chassis.handle_line("0/1 p_traffic ?"), vec!["0/1 P_TRAFFIC OFF"]);
        assert_eq!(chassis.handle_line("c_traffic on 0 5"), vec![REPLY_BAD_PORT]);
        assert_eq!(chassis.handle_line("c_traffic on 3 0"), vec![REPLY_BAD_MODULE]);
    }

    #[test]
    fn test_received_commands_recorded() {
        let mut chassis = logged_on();
        chassis.handle_line("  ");
        chassis.handle_line("c_model ?");

        assert_eq!(
            chassis.received_commands(),
            &["c_logon \"xena\"", "c_owner \"tester\"", "c_model ?"]
        );
    }
}
