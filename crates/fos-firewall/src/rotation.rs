//! Server address rotation
//!
//! Permits for the VPN server address are kept for the two most recently
//! used servers, so reconnecting to the previous server does not open a
//! window where its address is blocked. The rotation only does the
//! bookkeeping; destroying evicted filters is left to the caller.

use crate::params::SessionType;
use crate::provider::FilterId;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

/// Maximum number of retained server permits
pub const MAX_RETAINED_SERVERS: usize = 2;

/// Permit filters installed for one server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddressFilterCollection {
    pub server_ip: Ipv4Addr,
    pub session_type: SessionType,
    pub filter_ids: Vec<FilterId>,
}

/// Most-recently-used window of server permits (oldest first)
#[derive(Debug, Default)]
pub struct ServerAddressRotation {
    collections: VecDeque<ServerAddressFilterCollection>,
}

impl ServerAddressRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an existing collection to most-recently-used
    ///
    /// Returns false if no collection for `ip` in `session` exists.
    pub fn promote(&mut self, ip: Ipv4Addr, session: SessionType) -> bool {
        let Some(pos) = self
            .collections
            .iter()
            .position(|c| c.server_ip == ip && c.session_type == session)
        else {
            return false;
        };

        if let Some(collection) = self.collections.remove(pos) {
            self.collections.push_back(collection);
        }
        true
    }

    /// Append a collection, returning whatever fell out of the window
    pub fn push(
        &mut self,
        collection: ServerAddressFilterCollection,
    ) -> Vec<ServerAddressFilterCollection> {
        self.collections.push_back(collection);

        let mut evicted = Vec::new();
        while self.collections.len() > MAX_RETAINED_SERVERS {
            if let Some(oldest) = self.collections.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Remove every collection created in `session`
    pub fn take_session(&mut self, session: SessionType) -> Vec<ServerAddressFilterCollection> {
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .collections
            .drain(..)
            .partition(|c| c.session_type == session);
        self.collections = kept.into();
        taken
    }

    pub fn clear(&mut self) {
        self.collections.clear();
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Server addresses, oldest first
    pub fn servers(&self) -> Vec<Ipv4Addr> {
        self.collections.iter().map(|c| c.server_ip).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerAddressFilterCollection> {
        self.collections.iter()
    }
}
