//! VPN Connection
//!
//! The tunnel connection seen from the leak guard: a connect/disconnect
//! surface plus a stream of state changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tokio::sync::broadcast;

/// VPN connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpnStatus {
    /// VPN is disconnected
    Disconnected,
    /// Probing the requested servers
    Pinging,
    /// VPN is connecting
    Connecting,
    /// Tunnel is up, waiting for the handshake to finish
    Waiting,
    /// Authenticating with the server
    Authenticating,
    /// VPN is connected and ready
    Connected,
    /// Reconnecting after drop
    Reconnecting,
    /// VPN is disconnecting
    Disconnecting,
}

impl VpnStatus {
    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, VpnStatus::Connected)
    }
}

/// Tunnel protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnProtocol {
    OpenVpnUdp,
    OpenVpnTcp,
    WireGuard,
}

impl VpnProtocol {
    pub fn is_openvpn(&self) -> bool {
        matches!(self, VpnProtocol::OpenVpnUdp | VpnProtocol::OpenVpnTcp)
    }
}

/// A server the connection may be established to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnServer {
    /// Human readable label
    pub label: String,
    /// Entry IP address
    pub ip: Ipv4Addr,
}

impl VpnServer {
    pub fn new(label: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            label: label.into(),
            ip,
        }
    }
}

/// Negotiated parameters of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub protocol: VpnProtocol,
    /// IPv6 is carried through the tunnel
    pub ipv6_enabled: bool,
}

impl ConnectionConfig {
    pub fn new(protocol: VpnProtocol) -> Self {
        Self {
            protocol,
            ipv6_enabled: false,
        }
    }

    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6_enabled = enabled;
        self
    }
}

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnState {
    pub status: VpnStatus,
    pub server: Option<VpnServer>,
    pub protocol: Option<VpnProtocol>,
}

impl VpnState {
    pub fn new(status: VpnStatus) -> Self {
        Self {
            status,
            server: None,
            protocol: None,
        }
    }

    pub fn with_server(mut self, server: VpnServer) -> Self {
        self.server = Some(server);
        self
    }

    pub fn with_protocol(mut self, protocol: VpnProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }
}

/// A VPN tunnel connection
#[async_trait]
pub trait VpnConnection: Send + Sync {
    /// Establish the tunnel to one of `servers`
    async fn connect(&self, servers: Vec<VpnServer>, config: ConnectionConfig);

    async fn disconnect(&self);

    /// Drop and re-establish the current tunnel
    async fn reset_connection(&self);

    /// Subscribe to state changes
    fn subscribe(&self) -> broadcast::Receiver<VpnState>;
}
