//! Port forwarding state published to observers

use crate::message::PortMappingReply;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Lifecycle of the port mapping client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PortMappingStatus {
    #[default]
    Stopped,
    Starting,
    HelloCommunication,
    PortMappingCommunication,
    SleepingUntilRefresh,
    DestroyPortMappingCommunication,
    Error,
}

/// Internal/external port pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappedPort {
    pub internal_port: u16,
    pub external_port: u16,
}

impl fmt::Display for MappedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.internal_port, self.external_port)
    }
}

/// Granted mapping with its lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporaryMappedPort {
    pub mapped_port: MappedPort,
    pub lifetime: Duration,
    pub expiration: SystemTime,
}

impl TemporaryMappedPort {
    pub fn from_reply(reply: &PortMappingReply, now: SystemTime) -> Self {
        let lifetime = Duration::from_secs(u64::from(reply.lifetime_seconds));
        Self {
            mapped_port: MappedPort {
                internal_port: reply.internal_port,
                external_port: reply.external_port,
            },
            lifetime,
            expiration: now + lifetime,
        }
    }
}

/// Snapshot published on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortForwardingState {
    pub status: PortMappingStatus,
    pub mapped_port: Option<TemporaryMappedPort>,
    pub timestamp: SystemTime,
}

impl PortForwardingState {
    pub fn new(status: PortMappingStatus, mapped_port: Option<TemporaryMappedPort>) -> Self {
        Self {
            status,
            mapped_port,
            timestamp: SystemTime::now(),
        }
    }

    /// External port, if one is mapped
    pub fn external_port(&self) -> Option<u16> {
        self.mapped_port.as_ref().map(|m| m.mapped_port.external_port)
    }
}

impl Default for PortForwardingState {
    fn default() -> Self {
        Self::new(PortMappingStatus::Stopped, None)
    }
}
