//! Packet Filter Provider
//!
//! The boundary between the firewall engine and the operating system's
//! filtering platform. The engine never talks to the OS directly: every
//! filter is created through [`PacketFilterProvider`], which hands back an
//! opaque [`FilterId`] that is later used to destroy it.
//!
//! # Sublayers
//!
//! Filters live in one of two sublayers, selected by [`SessionType`]:
//!
//! | Sublayer | Survives service stop | Used for |
//! |----------|-----------------------|----------|
//! | Dynamic | No | Regular kill switch |
//! | Permanent | Yes | Crash/reboot-safe kill switch |

use crate::params::SessionType;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Opaque identifier returned by the filtering platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u64);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What a filter does with matching traffic
///
/// Hard actions cannot be overridden by lower-weight filters in other
/// sublayers; soft actions can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    SoftPermit,
    HardPermit,
    SoftBlock,
    HardBlock,
}

impl FilterAction {
    /// Check if the action lets traffic through
    pub fn is_permit(&self) -> bool {
        matches!(self, FilterAction::SoftPermit | FilterAction::HardPermit)
    }
}

/// Filtering layer a filter is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Outbound IPv4 connect authorization
    AppAuthConnectV4,
    /// Outbound IPv6 connect authorization
    AppAuthConnectV6,
    /// Inbound IPv4 accept authorization
    AppAuthRecvAcceptV4,
    /// Inbound IPv6 accept authorization
    AppAuthRecvAcceptV6,
    /// Raw outbound IPv4 packets (used by the DNS callout)
    OutboundIpPacketV4,
}

impl Layer {
    /// Check if this layer carries IPv6 traffic
    pub fn is_ipv6(&self) -> bool {
        matches!(self, Layer::AppAuthConnectV6 | Layer::AppAuthRecvAcceptV6)
    }
}

/// Human-readable name and description shown by OS tooling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayData {
    pub name: String,
    pub description: String,
}

impl DisplayData {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Common attributes of every filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub display: DisplayData,
    pub action: FilterAction,
    pub layer: Layer,
    /// Higher weight wins within a sublayer
    pub weight: u32,
    /// Keep the filter across a reboot
    pub persistent: bool,
}

/// Remote network (address + prefix length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpNetwork {
    /// IPv4 network from a dotted netmask
    pub fn v4(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            addr: IpAddr::V4(addr),
            prefix: u32::from(mask).leading_ones() as u8,
        }
    }

    /// IPv6 network from a prefix length
    pub fn v6(addr: Ipv6Addr, prefix: u8) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            prefix: prefix.min(128),
        }
    }

    /// Single host network
    pub fn host(addr: IpAddr) -> Self {
        let prefix = if addr.is_ipv4() { 32 } else { 128 };
        Self { addr, prefix }
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// IPv4 netmask for this prefix (None for IPv6)
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        match self.addr {
            IpAddr::V4(_) => {
                let bits = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(self.prefix.min(32)))
                };
                Some(Ipv4Addr::from(bits))
            }
            IpAddr::V6(_) => None,
        }
    }

    /// Parse CIDR notation (e.g. "10.0.0.0/8"); a bare address is a host
    pub fn parse(cidr: &str) -> Option<Self> {
        match cidr.split_once('/') {
            Some((ip, prefix)) => {
                let addr: IpAddr = ip.trim().parse().ok()?;
                let prefix: u8 = prefix.trim().parse().ok()?;
                let max = if addr.is_ipv4() { 32 } else { 128 };
                (prefix <= max).then_some(Self { addr, prefix })
            }
            None => cidr.trim().parse().ok().map(Self::host),
        }
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// ICMPv6 neighbor discovery messages that must pass the kill switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdpMessage {
    RouterSolicitation,
    RouterAdvertisement,
    NeighborSolicitation,
    NeighborAdvertisement,
    Redirect,
}

impl NdpMessage {
    /// ICMPv6 type number
    pub fn icmp_type(&self) -> u8 {
        match self {
            NdpMessage::RouterSolicitation => 133,
            NdpMessage::RouterAdvertisement => 134,
            NdpMessage::NeighborSolicitation => 135,
            NdpMessage::NeighborAdvertisement => 136,
            NdpMessage::Redirect => 137,
        }
    }
}

/// Filtering platform errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Filtering platform error: {0}")]
    Platform(String),

    #[error("Network interface with index {0} was not found")]
    AdapterNotFound(u32),

    #[error("Callout driver error: {0}")]
    Driver(String),
}

/// Operating system packet filter
///
/// Every creation call is scoped to the sublayer of `session` and returns
/// the id of the new filter. Implementations must treat destroying an
/// unknown id as a no-op.
pub trait PacketFilterProvider: Send + Sync {
    /// Match a single remote IPv4 address
    fn create_remote_ipv4_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        addr: Ipv4Addr,
    ) -> Result<FilterId, FilterError>;

    /// Match a remote network (IPv4 or IPv6)
    fn create_remote_network_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        network: IpNetwork,
    ) -> Result<FilterId, FilterError>;

    /// Match all traffic on a local network interface
    fn create_net_interface_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        interface_index: u32,
    ) -> Result<FilterId, FilterError>;

    /// Match traffic originating from an executable
    fn create_app_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        app_path: &Path,
    ) -> Result<FilterId, FilterError>;

    /// Match loopback traffic
    fn create_loopback_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError>;

    /// Match everything on the layer
    fn create_layer_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError>;

    /// Match a remote UDP port
    fn create_remote_udp_port_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        port: u16,
    ) -> Result<FilterId, FilterError>;

    /// Match a remote TCP port
    fn create_remote_tcp_port_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        port: u16,
    ) -> Result<FilterId, FilterError>;

    /// Block traffic to `server` unless it comes from `tunnel_app`
    fn block_outside_tunnel_app(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        tunnel_app: &Path,
        server: IpAddr,
    ) -> Result<FilterId, FilterError>;

    /// Hand DNS packets leaving outside `interface_index` to the callout driver
    fn block_outside_dns(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        interface_index: u32,
    ) -> Result<FilterId, FilterError>;

    /// Outbound DHCPv6 (address configuration send)
    fn permit_outbound_ipv6_dhcp(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError>;

    /// Inbound DHCPv6 (address configuration receive)
    fn permit_inbound_ipv6_dhcp(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError>;

    /// ICMPv6 neighbor discovery message
    fn permit_ndp_message(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        message: NdpMessage,
    ) -> Result<FilterId, FilterError>;

    /// Destroy one filter (unknown ids are ignored)
    fn destroy_filter(&self, session: SessionType, id: FilterId) -> Result<(), FilterError>;

    /// Destroy every filter of the sublayer
    fn destroy_all_filters(&self, session: SessionType) -> Result<(), FilterError>;

    /// Destroy every filter of the sublayer with the given display name
    fn destroy_filters_by_name(&self, session: SessionType, name: &str) -> Result<(), FilterError>;

    /// Number of filters currently installed in the sublayer
    fn filter_count(&self, session: SessionType) -> Result<usize, FilterError>;
}

/// OS-level DNS redirection policy (NRPT)
pub trait DnsRedirectProvider: Send + Sync {
    /// Returns false if the rule could not be registered
    fn create_rule(&self) -> bool;

    /// Returns false if there was nothing to delete or deletion failed
    fn delete_rule(&self) -> bool;
}

/// Companion driver that redirects DNS packets handed over by the callout filter
pub trait CalloutDriver: Send + Sync {
    fn start(&self) -> Result<(), FilterError>;

    fn stop(&self) -> Result<(), FilterError>;
}
