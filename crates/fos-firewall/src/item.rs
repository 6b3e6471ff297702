//! Filter bookkeeping
//!
//! Every filter the engine installs is recorded with a tag saying which
//! part of the filter set it belongs to, so partial updates can remove
//! exactly one group.

use crate::params::SessionType;
use crate::provider::FilterId;

/// Group a filter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Base kill switch and DNS block filters
    VariableFilter,
    /// Private network permits
    LocalNetworkFilter,
    /// Tunnel interface permits
    PermitInterfaceFilter,
    /// Anti-spoof block for the VPN server
    BlockOutsideOpenVpnFilter,
    /// DNS callout filter
    DnsCalloutFilter,
    /// Port 53 permit paired with the callout
    DnsFilter,
}

/// Installed filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirewallItem {
    pub id: FilterId,
    pub item_type: ItemType,
    /// Sublayer the filter lives in
    pub session: SessionType,
}

impl FirewallItem {
    pub fn new(id: FilterId, item_type: ItemType, session: SessionType) -> Self {
        Self { id, item_type, session }
    }
}

/// Installed filters, in creation order
#[derive(Debug, Default)]
pub struct FirewallItems {
    items: Vec<FirewallItem>,
}

impl FirewallItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: FirewallItem) {
        self.items.push(item);
    }

    /// Remove and return every item of the given types
    pub fn take(&mut self, types: &[ItemType]) -> Vec<FirewallItem> {
        let (taken, kept) = self
            .items
            .drain(..)
            .partition(|item| types.contains(&item.item_type));
        self.items = kept;
        taken
    }

    pub fn count(&self, item_type: ItemType) -> usize {
        self.items.iter().filter(|i| i.item_type == item_type).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FirewallItem> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
