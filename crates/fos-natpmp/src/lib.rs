//! fOS NAT-PMP - Port Forwarding Client
//!
//! Maps one external port for both TCP and UDP on the VPN gateway and keeps
//! the lease alive.
//!
//! # Features
//!
//! - **RFC 6886 wire format**: hello and mapping queries over UDP/5351
//! - **Exponential backoff**: 250 ms doubling to 64 s, nine attempts
//! - **Automatic renewal**: the lease is refreshed at half its lifetime
//! - **Clean teardown**: mappings are destroyed on stop
//! - **State broadcast**: every transition is published to subscribers

mod client;
mod config;
mod error;
mod gateway;
mod message;
mod state;
mod transport;

#[cfg(test)]
mod testing;

pub use client::NatPmpClient;
pub use config::{NAT_PMP_PORT, NatPmpConfig};
pub use error::NatPmpError;
pub use gateway::{GatewayProvider, IssueReporter, LogIssueReporter, StaticGateway};
pub use message::{
    HelloQuery, HelloReply, MappingProtocol, NAT_PMP_VERSION, PortMappingQuery, PortMappingReply,
    REPLY_OPCODE_OFFSET, result_code_description,
};
pub use state::{MappedPort, PortForwardingState, PortMappingStatus, TemporaryMappedPort};
pub use transport::{PmpTransport, UdpTransport};
