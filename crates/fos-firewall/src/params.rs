//! Firewall Parameters
//!
//! Immutable snapshot of everything the engine needs to build the filter
//! set. The engine keeps the last applied snapshot and compares each new
//! one against it field by field to decide what has to change.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Filter sublayer a set of filters is created in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Cleared when the service stops
    #[default]
    Dynamic,
    /// Survives service stop, crash and reboot
    Permanent,
}

/// How DNS queries are forced into the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsBlockMode {
    /// OS name resolution policy rule, falling back to the callout
    #[default]
    Nrpt,
    /// Packet-level callout filter handled by the driver
    Callout,
    /// Port 53 is blocked, no redirection
    Disabled,
}

/// Snapshot of firewall parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallParams {
    /// VPN server address to permit (None while unknown)
    pub server_ip: Option<Ipv4Addr>,
    /// Keep filters across reboot
    pub persistent: bool,
    /// Sublayer to install the variable filters into
    pub session_type: SessionType,
    /// DNS redirection mode
    pub dns_block_mode: DnsBlockMode,
    /// Only install DNS leak protection, no kill switch
    pub dns_leak_only: bool,
    /// Tunnel interface index (0 = not known yet)
    pub interface_index: u32,
    /// Install tunnel-interface permits and the DNS callout
    pub add_interface_filters: bool,
    /// Permit private networks
    pub lan_access: bool,
    /// Set when leak protection was recovered from an existing permanent sublayer
    #[serde(skip)]
    pub permanent_state_after_reboot: bool,
}

impl FirewallParams {
    /// Parameters for a connection to `server_ip`
    pub fn new(server_ip: Ipv4Addr) -> Self {
        Self {
            server_ip: Some(server_ip),
            ..Self::default()
        }
    }

    /// Empty parameters (nothing applied)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_session_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_dns_block_mode(mut self, mode: DnsBlockMode) -> Self {
        self.dns_block_mode = mode;
        self
    }

    pub fn with_dns_leak_only(mut self, dns_leak_only: bool) -> Self {
        self.dns_leak_only = dns_leak_only;
        self
    }

    pub fn with_interface(mut self, index: u32, add_interface_filters: bool) -> Self {
        self.interface_index = index;
        self.add_interface_filters = add_interface_filters;
        self
    }

    pub fn with_lan_access(mut self, lan_access: bool) -> Self {
        self.lan_access = lan_access;
        self
    }

    /// Check if the tunnel interface is known
    pub fn has_interface(&self) -> bool {
        self.interface_index != 0
    }

    /// Check if the interface or DNS mode differs from `other`
    pub(crate) fn interface_or_dns_changed(&self, other: &Self) -> bool {
        self.interface_index != other.interface_index
            || self.dns_block_mode != other.dns_block_mode
    }
}

impl Default for FirewallParams {
    fn default() -> Self {
        Self {
            server_ip: None,
            persistent: false,
            session_type: SessionType::Dynamic,
            dns_block_mode: DnsBlockMode::Nrpt,
            dns_leak_only: false,
            interface_index: 0,
            add_interface_filters: false,
            lan_access: false,
            permanent_state_after_reboot: false,
        }
    }
}
