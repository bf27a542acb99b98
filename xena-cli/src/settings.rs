//! Inventory tool settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xena_manager::SessionConfig;

/// One chassis to connect to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChassisEntry {
    /// IP address or host name
    pub address: String,
    /// CLI port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Logon password
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_port() -> u16 {
    xena_manager::DEFAULT_PORT
}

fn default_password() -> String {
    "xena".to_string()
}

impl ChassisEntry {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: default_port(),
            password: default_password(),
        }
    }
}

/// Saved tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session owner, timeouts and dummy mode
    pub session: SessionConfig,
    /// Chassis to inventory
    pub chassis: Vec<ChassisEntry>,
    /// Ports to reserve and list streams for, as `ip/module/port`
    pub ports: Vec<String>,
    /// Take ports from other users when reserving
    pub force: bool,
    /// Release reserved ports on exit
    pub release_on_exit: bool,
    /// Directory to write one config file per reserved port into
    pub save_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            chassis: Vec::new(),
            ports: Vec::new(),
            force: false,
            release_on_exit: true,
            save_dir: None,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for the tool
    /// Uses $XDG_CONFIG_HOME/xena-manager on Linux/macOS, falls back to ~/.config/xena-manager
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("xena-manager"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("xena-manager"))
    }

    /// Default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load settings from `path`
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{"chassis": [{"address": "192.168.1.10"}], "session": {"owner": "lab"}}"#,
        )
        .unwrap();
        assert_eq!(settings.chassis, vec![ChassisEntry::new("192.168.1.10")]);
        assert_eq!(settings.chassis[0].port, 22611);
        assert_eq!(settings.session.owner, "lab");
        assert!(settings.release_on_exit);
        assert!(settings.ports.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            ports: vec!["10.0.0.1/0/0".to_string()],
            force: true,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.ports, settings.ports);
        assert!(loaded.force);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load_from(&dir.path().join("none.json")).is_err());
    }
}
