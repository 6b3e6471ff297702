//! NAT-PMP errors

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NatPmpError {
    #[error("The default gateway is missing, NAT-PMP can't start without it")]
    MissingGateway,

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Message too short: expected {expected} bytes, got {actual}")]
    ShortMessage { expected: usize, actual: usize },

    #[error("Unsupported NAT-PMP version {0}")]
    UnsupportedVersion(u8),

    #[error("Unexpected opcode {actual} (expected {expected})")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    #[error("Unsupported opcode {0}")]
    UnsupportedOpcode(u8),

    #[error("Gateway returned result code {code} ({description})")]
    ResultCode { code: u16, description: &'static str },

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("No reply after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    #[error("Both TCP and UDP port mapping requests failed")]
    MappingFailed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

impl NatPmpError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NatPmpError::Cancelled)
    }
}
