//! IP layer selection
//!
//! Most filters are installed once per address family. [`IpLayer`] holds the
//! layers each family maps to so the engine can iterate them instead of
//! hard-coding layer names at every call site.

use crate::provider::{IpNetwork, Layer};

/// Layers an address-family filter is applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpLayer {
    ipv4: Vec<Layer>,
    ipv6: Vec<Layer>,
}

impl IpLayer {
    /// Outbound connect layers only
    pub fn outbound() -> Self {
        Self {
            ipv4: vec![Layer::AppAuthConnectV4],
            ipv6: vec![Layer::AppAuthConnectV6],
        }
    }

    /// Outbound connect and inbound accept layers
    pub fn bidirectional() -> Self {
        Self {
            ipv4: vec![Layer::AppAuthConnectV4, Layer::AppAuthRecvAcceptV4],
            ipv6: vec![Layer::AppAuthConnectV6, Layer::AppAuthRecvAcceptV6],
        }
    }

    pub fn ipv4(&self) -> &[Layer] {
        &self.ipv4
    }

    pub fn ipv6(&self) -> &[Layer] {
        &self.ipv6
    }

    /// Layers matching the address family of `network`
    pub fn for_network(&self, network: &IpNetwork) -> &[Layer] {
        if network.is_ipv6() { &self.ipv6 } else { &self.ipv4 }
    }
}

impl Default for IpLayer {
    fn default() -> Self {
        Self::outbound()
    }
}
