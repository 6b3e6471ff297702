//! fOS VPN - IPv6 Leak Protection
//!
//! Keeps IPv6 traffic from bypassing the tunnel while a VPN connection is
//! being established or is up.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐ connect / disconnect ┌───────────────────┐      ┌───────────────┐
//! │ Connection manager │─────────────────────▶│  Ipv6LeakGuard    │─────▶│ VpnConnection │
//! └────────────────────┘                      └─────────┬─────────┘      │   (tunnel)    │
//!                                                       │                └───────────────┘
//!          ┌──────────────────────┬─────────────────────┼──────────────────────┐
//!          ▼                      ▼                     ▼                      ▼
//!   ┌─────────────┐   ┌───────────────────────┐  ┌──────────────┐   ┌─────────────────┐
//!   │ SystemIpv6  │   │ NetworkChangeObserver │  │ Decoy        │   │ CommandRunner   │
//!   │ (toggle)    │   │ (interfaces added)    │  │ generator    │   │ (netsh)         │
//!   └─────────────┘   └───────────────────────┘  └──────────────┘   └─────────────────┘
//! ```
//!
//! # Features
//!
//! - **System IPv6 toggle**: off while connected through an IPv4-only tunnel
//! - **New adapter watch**: adapters appearing mid-session are switched off too
//! - **Decoy addresses**: IPv6 tunnels mask real global addresses instead
//! - **Live settings**: read through a watch channel on every connect

mod config;
mod connection;
mod decoy;
mod interfaces;
mod ipv6;
mod leak_guard;
mod observer;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, LeakGuardSettings, MAX_DECOY_ADDRESSES};
pub use connection::{
    ConnectionConfig, VpnConnection, VpnProtocol, VpnServer, VpnState, VpnStatus,
};
pub use decoy::{
    CommandError, CommandRunner, DecoyAddressGenerator, PrefixDecoyGenerator,
    ShellCommandRunner, add_address_commands, delete_address_commands,
};
pub use interfaces::{NetworkInterface, NetworkInterfaceProvider, is_global_unicast};
pub use ipv6::{Ipv6Toggle, Ipv6ToggleError, SystemIpv6};
pub use leak_guard::{Ipv6LeakGuard, Ipv6Platform};
pub use observer::NetworkChangeObserver;
