//! fOS Firewall - VPN Kill Switch Engine
//!
//! Drives the operating system's packet filter so that nothing leaves the
//! host outside the VPN tunnel.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   enable / disable   ┌──────────────────────┐
//! │ Connection manager │─────────────────────▶│    FirewallEngine    │
//! └────────────────────┘                      │  items + rotation    │
//!                                             └──────────┬───────────┘
//!                                                        │ FilterSpec
//!                          ┌─────────────────────────────┼───────────────┐
//!                          ▼                             ▼               ▼
//!               ┌──────────────────────┐   ┌──────────────────┐ ┌──────────────┐
//!               │ PacketFilterProvider │   │ DnsRedirect (NRPT)│ │ CalloutDriver│
//!               └──────────────────────┘   └──────────────────┘ └──────────────┘
//! ```
//!
//! # Features
//!
//! - **Diff-based updates**: re-enabling only rebuilds what changed
//! - **Crash-safe sessions**: permanent sublayer survives service restarts
//! - **DNS leak protection**: port 53 blocked, redirected via NRPT or callout
//! - **Server rotation**: permits for the two most recent servers are kept

mod config;
mod engine;
mod item;
mod layer;
mod params;
mod provider;
mod remote_address;
mod rotation;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, FirewallConfig};
pub use engine::{FirewallEngine, LeakProtectionStatus};
pub use item::{FirewallItem, FirewallItems, ItemType};
pub use layer::IpLayer;
pub use params::{DnsBlockMode, FirewallParams, SessionType};
pub use provider::{
    CalloutDriver, DisplayData, DnsRedirectProvider, FilterAction, FilterError, FilterId,
    FilterSpec, IpNetwork, Layer, NdpMessage, PacketFilterProvider,
};
pub use remote_address::PermittedRemoteAddresses;
pub use rotation::{MAX_RETAINED_SERVERS, ServerAddressFilterCollection, ServerAddressRotation};
