//! Decoy IPv6 Addresses
//!
//! Synthetic global addresses assigned to the tunnel adapter so the
//! operating system's source address selection never prefers a real,
//! leak-prone address on another adapter.
//!
//! # Flow
//!
//! ```text
//! fragments + real GUAs ─▶ DecoyAddressGenerator ─▶ [decoys]
//!                                                      │
//!                      add_address_commands(index) ◀───┘
//!                                 │
//!                                 ▼
//!                          CommandRunner (netsh)
//! ```

use crate::config::MAX_DECOY_ADDRESSES;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashSet;
use std::net::Ipv6Addr;
use tracing::{debug, error, warn};

/// Produces decoy addresses
#[async_trait]
pub trait DecoyAddressGenerator: Send + Sync {
    /// Up to `max_count` addresses drawn from `fragments`, none of them in `exclude`
    async fn generate_addresses(
        &self,
        fragments: &[String],
        exclude: &[Ipv6Addr],
        max_count: usize,
    ) -> Vec<Ipv6Addr>;
}

/// Runs platform commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute_multiple(&self, commands: Vec<String>) -> Result<(), CommandError>;
}

/// Command execution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
}

/// Commands assigning `addresses` to interface `index` without using them as source
pub fn add_address_commands(index: u32, addresses: &[Ipv6Addr]) -> Vec<String> {
    addresses
        .iter()
        .map(|addr| format!("netsh interface ipv6 add address {} {} skipassource=true", index, addr))
        .collect()
}

/// Commands removing `addresses` from interface `index`
pub fn delete_address_commands(index: u32, addresses: &[Ipv6Addr]) -> Vec<String> {
    addresses
        .iter()
        .map(|addr| format!("netsh interface ipv6 delete address {} {}", index, addr))
        .collect()
}

/// Parse `"2001:db8::/32"` into prefix and length
fn parse_fragment(fragment: &str) -> Option<(u128, u8)> {
    let (addr, len) = fragment.trim().split_once('/')?;
    let addr: Ipv6Addr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    (len <= 128).then_some((u128::from(addr), len))
}

/// Random interface identifiers inside configured prefixes
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixDecoyGenerator;

impl PrefixDecoyGenerator {
    pub fn new() -> Self {
        Self
    }

    fn generate(fragments: &[String], exclude: &[Ipv6Addr], max_count: usize) -> Vec<Ipv6Addr> {
        let prefixes: Vec<(u128, u8)> = fragments
            .iter()
            .filter_map(|f| {
                let parsed = parse_fragment(f);
                if parsed.is_none() {
                    warn!("Ignoring invalid IPv6 fragment {:?}", f);
                }
                parsed
            })
            .collect();
        let max_count = max_count.min(MAX_DECOY_ADDRESSES);
        if prefixes.is_empty() || max_count == 0 {
            return Vec::new();
        }

        let excluded: HashSet<Ipv6Addr> = exclude.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(max_count);
        let mut rng = rand::thread_rng();

        // Small prefixes may not hold max_count distinct addresses
        for attempt in 0..max_count.saturating_mul(4) {
            if out.len() == max_count {
                break;
            }
            let (prefix, len) = prefixes[attempt % prefixes.len()];
            let host_mask = u128::MAX.checked_shr(u32::from(len)).unwrap_or(0);
            let addr = Ipv6Addr::from((prefix & !host_mask) | (rng.r#gen::<u128>() & host_mask));

            if !excluded.contains(&addr) && seen.insert(addr) {
                out.push(addr);
            }
        }
        out
    }
}

#[async_trait]
impl DecoyAddressGenerator for PrefixDecoyGenerator {
    async fn generate_addresses(
        &self,
        fragments: &[String],
        exclude: &[Ipv6Addr],
        max_count: usize,
    ) -> Vec<Ipv6Addr> {
        let addresses = Self::generate(fragments, exclude, max_count);
        debug!("Generated {} decoy IPv6 addresses", addresses.len());
        addresses
    }
}

/// Runs each command line as a child process, in order
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute_multiple(&self, commands: Vec<String>) -> Result<(), CommandError> {
        let mut first_error = None;
        for command in commands {
            if let Err(e) = run_command(&command).await {
                error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

async fn run_command(command: &str) -> Result<(), CommandError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(CommandError::Empty)?;

    let status = tokio::process::Command::new(program)
        .args(parts)
        .status()
        .await
        .map_err(|e| CommandError::Launch {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Failed {
            command: command.to_string(),
            status: status.to_string(),
        })
    }
}
