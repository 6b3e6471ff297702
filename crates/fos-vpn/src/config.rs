//! Leak Guard Settings
//!
//! User-facing IPv6 settings read by the leak guard on every connect.
//! Live values are handed over through a `tokio::sync::watch` channel.
//!
//! # Example
//!
//! ```toml
//! ipv6_leak_protection = true
//! ipv6_fragments = ["2a07:b944::/32"]
//! tunnel_adapter_id = "wintun"
//! max_decoy_addresses = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on decoy addresses per generation
pub const MAX_DECOY_ADDRESSES: usize = 50;

/// IPv6 leak protection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakGuardSettings {
    /// Block IPv6 outside the tunnel
    pub ipv6_leak_protection: bool,
    /// Prefixes decoy addresses are drawn from
    pub ipv6_fragments: Vec<String>,
    /// Name reported to the platform when toggling bindings
    pub app_name: String,
    /// Hardware id of the tunnel adapter
    pub tunnel_adapter_id: String,
    pub max_decoy_addresses: usize,
}

impl LeakGuardSettings {
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
}

impl Default for LeakGuardSettings {
    fn default() -> Self {
        Self {
            ipv6_leak_protection: true,
            ipv6_fragments: Vec::new(),
            app_name: "fOS VPN".to_string(),
            tunnel_adapter_id: "wintun".to_string(),
            max_decoy_addresses: MAX_DECOY_ADDRESSES,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
