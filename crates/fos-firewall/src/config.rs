//! Firewall Configuration
//!
//! Static settings that do not change between connections: which
//! executables may bypass the tunnel and the name prefix used for every
//! filter's display data.
//!
//! # Example
//!
//! ```toml
//! app_name = "fOS VPN"
//! client_exe = "C:\\Program Files\\fOS VPN\\fos-client.exe"
//! service_exe = "C:\\Program Files\\fOS VPN\\fos-service.exe"
//! wireguard_service_exe = "C:\\Program Files\\fOS VPN\\fos-wireguard.exe"
//! openvpn_exe = "C:\\Program Files\\fOS VPN\\openvpn.exe"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Static firewall configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Prefix for filter display names
    pub app_name: String,
    /// Client executable
    pub client_exe: PathBuf,
    /// Background service executable
    pub service_exe: PathBuf,
    /// WireGuard tunnel service executable
    pub wireguard_service_exe: PathBuf,
    /// OpenVPN executable (the only process allowed to reach the server)
    pub openvpn_exe: PathBuf,
}

impl FirewallConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Executables permitted to bypass the tunnel
    pub fn permitted_apps(&self) -> [&Path; 3] {
        [
            self.client_exe.as_path(),
            self.service_exe.as_path(),
            self.wireguard_service_exe.as_path(),
        ]
    }

    /// Display name shared by all app permit filters
    pub fn permit_app_filter_name(&self) -> String {
        format!("{} permit app", self.app_name)
    }

    /// Prefix a filter name with the app name
    pub(crate) fn filter_name(&self, name: &str) -> String {
        format!("{} {}", self.app_name, name)
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        let dir = PathBuf::from("C:\\Program Files\\fOS VPN");
        Self {
            app_name: "fOS VPN".to_string(),
            client_exe: dir.join("fos-client.exe"),
            service_exe: dir.join("fos-service.exe"),
            wireguard_service_exe: dir.join("fos-wireguard.exe"),
            openvpn_exe: dir.join("openvpn.exe"),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let config = FirewallConfig::from_toml(
            r#"
            app_name = "Test VPN"
            openvpn_exe = "/opt/vpn/openvpn"
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "Test VPN");
        assert_eq!(config.openvpn_exe, PathBuf::from("/opt/vpn/openvpn"));
        assert_eq!(config.client_exe, FirewallConfig::default().client_exe);
        assert_eq!(config.permit_app_filter_name(), "Test VPN permit app");
    }

    #[test]
    fn test_from_json() {
        let config = FirewallConfig::from_json(r#"{"client_exe": "/usr/bin/client"}"#).unwrap();
        assert_eq!(config.permitted_apps()[0], Path::new("/usr/bin/client"));
    }

    #[test]
    fn test_parse_error() {
        let result = FirewallConfig::from_toml("app_name = [");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FirewallConfig::from_toml_file(Path::new("/nonexistent/firewall.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
