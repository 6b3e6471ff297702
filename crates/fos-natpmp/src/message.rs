//! NAT-PMP wire messages (RFC 6886)
//!
//! All fields are big-endian.
//!
//! ```text
//! Hello query      | version | opcode=0 |
//! Hello reply      | version | 128 | result(2) | epoch(4) | external ip(4) |
//! Mapping query    | version | op  | reserved(2) | internal(2) | external(2) | lifetime(4) |
//! Mapping reply    | version | op+128 | result(2) | epoch(4) | internal(2) | external(2) | lifetime(4) |
//! ```

use crate::error::NatPmpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Protocol version spoken by this client
pub const NAT_PMP_VERSION: u8 = 0;

/// Reply opcodes are the request opcode plus this offset
pub const REPLY_OPCODE_OFFSET: u8 = 128;

const HELLO_OPCODE: u8 = 0;
const HELLO_REPLY_LEN: usize = 12;
const MAPPING_QUERY_LEN: usize = 12;
const MAPPING_REPLY_LEN: usize = 16;

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingProtocol {
    Udp = 1,
    Tcp = 2,
}

impl MappingProtocol {
    pub fn opcode(self) -> u8 {
        self as u8
    }

    pub fn reply_opcode(self) -> u8 {
        self.opcode() + REPLY_OPCODE_OFFSET
    }
}

impl fmt::Display for MappingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingProtocol::Udp => write!(f, "UDP"),
            MappingProtocol::Tcp => write!(f, "TCP"),
        }
    }
}

/// Human readable result code
pub fn result_code_description(code: u16) -> &'static str {
    match code {
        0 => "success",
        1 => "unsupported version",
        2 => "not authorized/refused",
        3 => "network failure",
        4 => "out of resources",
        5 => "unsupported opcode",
        _ => "unknown error",
    }
}

/// Public address request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HelloQuery;

impl HelloQuery {
    pub fn to_bytes(&self) -> [u8; 2] {
        [NAT_PMP_VERSION, HELLO_OPCODE]
    }
}

/// Public address reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloReply {
    pub result_code: u16,
    /// Seconds since the gateway's mapping table was reset
    pub epoch_seconds: u32,
    pub external_ip: Ipv4Addr,
}

impl HelloReply {
    pub fn parse(bytes: &[u8]) -> Result<Self, NatPmpError> {
        check_header(bytes, HELLO_REPLY_LEN, HELLO_OPCODE + REPLY_OPCODE_OFFSET)?;
        Ok(Self {
            result_code: be_u16(bytes, 2),
            epoch_seconds: be_u32(bytes, 4),
            external_ip: Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HELLO_REPLY_LEN] {
        let mut out = [0u8; HELLO_REPLY_LEN];
        out[0] = NAT_PMP_VERSION;
        out[1] = HELLO_OPCODE + REPLY_OPCODE_OFFSET;
        out[2..4].copy_from_slice(&self.result_code.to_be_bytes());
        out[4..8].copy_from_slice(&self.epoch_seconds.to_be_bytes());
        out[8..12].copy_from_slice(&self.external_ip.octets());
        out
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Port mapping request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMappingQuery {
    pub protocol: MappingProtocol,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_seconds: u32,
}

impl PortMappingQuery {
    /// New mapping, ports left to the gateway
    pub fn new(protocol: MappingProtocol, lifetime_seconds: u32) -> Self {
        Self {
            protocol,
            internal_port: 0,
            external_port: 0,
            lifetime_seconds,
        }
    }

    /// Ask for the ports of a previous mapping
    pub fn with_ports(mut self, internal_port: u16, external_port: u16) -> Self {
        self.internal_port = internal_port;
        self.external_port = external_port;
        self
    }

    /// Delete the mapping of `internal_port`
    pub fn destroy(protocol: MappingProtocol, internal_port: u16) -> Self {
        Self {
            protocol,
            internal_port,
            external_port: 0,
            lifetime_seconds: 0,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, NatPmpError> {
        if bytes.len() < MAPPING_QUERY_LEN {
            return Err(NatPmpError::ShortMessage {
                expected: MAPPING_QUERY_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != NAT_PMP_VERSION {
            return Err(NatPmpError::UnsupportedVersion(bytes[0]));
        }
        let protocol = match bytes[1] {
            1 => MappingProtocol::Udp,
            2 => MappingProtocol::Tcp,
            other => return Err(NatPmpError::UnsupportedOpcode(other)),
        };
        Ok(Self {
            protocol,
            internal_port: be_u16(bytes, 4),
            external_port: be_u16(bytes, 6),
            lifetime_seconds: be_u32(bytes, 8),
        })
    }

    pub fn to_bytes(&self) -> [u8; MAPPING_QUERY_LEN] {
        let mut out = [0u8; MAPPING_QUERY_LEN];
        out[0] = NAT_PMP_VERSION;
        out[1] = self.protocol.opcode();
        out[4..6].copy_from_slice(&self.internal_port.to_be_bytes());
        out[6..8].copy_from_slice(&self.external_port.to_be_bytes());
        out[8..12].copy_from_slice(&self.lifetime_seconds.to_be_bytes());
        out
    }
}

/// Port mapping reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMappingReply {
    pub protocol: MappingProtocol,
    pub result_code: u16,
    pub epoch_seconds: u32,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_seconds: u32,
}

impl PortMappingReply {
    /// Parse a reply to a `protocol` request
    pub fn parse(bytes: &[u8], protocol: MappingProtocol) -> Result<Self, NatPmpError> {
        check_header(bytes, MAPPING_REPLY_LEN, protocol.reply_opcode())?;
        Ok(Self {
            protocol,
            result_code: be_u16(bytes, 2),
            epoch_seconds: be_u32(bytes, 4),
            internal_port: be_u16(bytes, 8),
            external_port: be_u16(bytes, 10),
            lifetime_seconds: be_u32(bytes, 12),
        })
    }

    pub fn to_bytes(&self) -> [u8; MAPPING_REPLY_LEN] {
        let mut out = [0u8; MAPPING_REPLY_LEN];
        out[0] = NAT_PMP_VERSION;
        out[1] = self.protocol.reply_opcode();
        out[2..4].copy_from_slice(&self.result_code.to_be_bytes());
        out[4..8].copy_from_slice(&self.epoch_seconds.to_be_bytes());
        out[8..10].copy_from_slice(&self.internal_port.to_be_bytes());
        out[10..12].copy_from_slice(&self.external_port.to_be_bytes());
        out[12..16].copy_from_slice(&self.lifetime_seconds.to_be_bytes());
        out
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Check if the gateway confirmed deletion of `internal_port`
    pub fn confirms_destroy(&self, internal_port: u16) -> bool {
        self.is_success()
            && self.internal_port == internal_port
            && self.external_port == 0
            && self.lifetime_seconds == 0
    }
}

fn check_header(bytes: &[u8], min_len: usize, opcode: u8) -> Result<(), NatPmpError> {
    if bytes.len() < min_len {
        return Err(NatPmpError::ShortMessage {
            expected: min_len,
            actual: bytes.len(),
        });
    }
    if bytes[0] != NAT_PMP_VERSION {
        return Err(NatPmpError::UnsupportedVersion(bytes[0]));
    }
    if bytes[1] != opcode {
        return Err(NatPmpError::UnexpectedOpcode {
            expected: opcode,
            actual: bytes[1],
        });
    }
    Ok(())
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
