//! Network interfaces as reported by the operating system

use crate::connection::VpnProtocol;
use std::net::{IpAddr, Ipv6Addr};
use tokio::sync::broadcast;

/// A network adapter and its unicast addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Stable adapter identifier
    pub id: String,
    /// Interface index used by routing and address commands
    pub index: u32,
    pub is_loopback: bool,
    pub unicast_addresses: Vec<IpAddr>,
}

impl NetworkInterface {
    pub fn new(id: impl Into<String>, index: u32) -> Self {
        Self {
            id: id.into(),
            index,
            is_loopback: false,
            unicast_addresses: Vec::new(),
        }
    }

    pub fn loopback(mut self) -> Self {
        self.is_loopback = true;
        self
    }

    pub fn with_address(mut self, addr: IpAddr) -> Self {
        self.unicast_addresses.push(addr);
        self
    }

    /// Publicly routable IPv6 addresses on this interface
    pub fn global_unicast_addresses(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.unicast_addresses.iter().filter_map(|addr| match addr {
            IpAddr::V6(v6) if is_global_unicast(v6) => Some(*v6),
            _ => None,
        })
    }
}

/// Check if `addr` is in 2000::/3
pub fn is_global_unicast(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xe000 == 0x2000
}

/// Operating system interface table
pub trait NetworkInterfaceProvider: Send + Sync {
    /// Current interfaces, loopback included
    fn interfaces(&self) -> Vec<NetworkInterface>;

    /// Adapter the tunnel for `protocol` runs on
    fn tunnel_interface(&self, protocol: VpnProtocol) -> Option<NetworkInterface>;

    /// Fires whenever any interface address changes
    fn subscribe(&self) -> broadcast::Receiver<()>;
}
