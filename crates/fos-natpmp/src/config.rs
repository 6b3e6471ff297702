//! NAT-PMP client configuration

use crate::error::NatPmpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway port from RFC 6886
pub const NAT_PMP_PORT: u16 = 5351;

/// Client timing and lease settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatPmpConfig {
    /// Gateway UDP port
    pub port: u16,
    /// First reply timeout (ms), doubled on every retry
    pub min_timeout_ms: u64,
    /// Last reply timeout (ms)
    pub max_timeout_ms: u64,
    /// Lease requested for each mapping (seconds)
    pub lease_seconds: u32,
}

impl NatPmpConfig {
    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, NatPmpError> {
        toml::from_str(content).map_err(|e| NatPmpError::Config(e.to_string()))
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, NatPmpError> {
        serde_json::from_str(content).map_err(|e| NatPmpError::Config(e.to_string()))
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }

    /// Reply timeouts for each attempt: min, 2*min, ... up to max
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut schedule = Vec::new();
        let mut timeout = self.min_timeout_ms.max(1);
        while timeout <= self.max_timeout_ms {
            schedule.push(Duration::from_millis(timeout));
            timeout *= 2;
        }
        schedule
    }
}

impl Default for NatPmpConfig {
    fn default() -> Self {
        Self {
            port: NAT_PMP_PORT,
            min_timeout_ms: 250,
            max_timeout_ms: 64_000,
            lease_seconds: 7200,
        }
    }
}
