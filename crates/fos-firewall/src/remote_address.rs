//! Permitted remote addresses
//!
//! Extra destinations (API endpoints, captive portals) that must stay
//! reachable while the kill switch is on. Permits go into the dynamic
//! sublayer above everything the engine installs.

use crate::layer::IpLayer;
use crate::params::SessionType;
use crate::provider::{DisplayData, FilterAction, FilterError, FilterId, FilterSpec, IpNetwork, PacketFilterProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const REMOTE_ADDRESS_WEIGHT: u32 = 14;

/// Remote addresses permitted through the kill switch
pub struct PermittedRemoteAddresses {
    provider: Arc<dyn PacketFilterProvider>,
    layers: IpLayer,
    display: DisplayData,
    permitted: HashMap<String, Vec<FilterId>>,
}

impl PermittedRemoteAddresses {
    pub fn new(provider: Arc<dyn PacketFilterProvider>, app_name: &str) -> Self {
        Self {
            provider,
            layers: IpLayer::default(),
            display: DisplayData::new(format!("{} permit remote address", app_name), ""),
            permitted: HashMap::new(),
        }
    }

    pub fn with_layers(mut self, layers: IpLayer) -> Self {
        self.layers = layers;
        self
    }

    /// Permit each address; already permitted and unparsable entries are skipped
    pub fn add_all<S: AsRef<str>>(&mut self, addresses: &[S], action: FilterAction) -> Result<(), FilterError> {
        for address in addresses {
            self.add(address.as_ref(), action)?;
        }
        Ok(())
    }

    /// Permit an address or CIDR network
    pub fn add(&mut self, address: &str, action: FilterAction) -> Result<(), FilterError> {
        if self.permitted.contains_key(address) {
            return Ok(());
        }

        let Some(network) = IpNetwork::parse(address) else {
            warn!("Ignoring invalid remote address {:?}", address);
            return Ok(());
        };

        let mut ids = Vec::new();
        for &layer in self.layers.for_network(&network) {
            let spec = FilterSpec {
                display: self.display.clone(),
                action,
                layer,
                weight: REMOTE_ADDRESS_WEIGHT,
                persistent: false,
            };
            match self
                .provider
                .create_remote_network_filter(SessionType::Dynamic, &spec, network)
            {
                Ok(id) => ids.push(id),
                Err(e) => {
                    self.rollback(&ids);
                    return Err(e);
                }
            }
        }

        self.permitted.insert(address.to_string(), ids);
        debug!("Permitted remote address {}", network);
        Ok(())
    }

    /// Remove the permit for an address (unknown addresses are ignored)
    ///
    /// Filters that could not be destroyed stay tracked so a later call
    /// retries them.
    pub fn remove(&mut self, address: &str) -> Result<(), FilterError> {
        let Some(ids) = self.permitted.remove(address) else {
            return Ok(());
        };

        let mut remaining = ids.into_iter();
        while let Some(id) = remaining.next() {
            if let Err(e) = self.provider.destroy_filter(SessionType::Dynamic, id) {
                let mut left = vec![id];
                left.extend(remaining);
                self.permitted.insert(address.to_string(), left);
                return Err(e);
            }
        }
        Ok(())
    }

    fn rollback(&self, ids: &[FilterId]) {
        for &id in ids {
            if let Err(e) = self.provider.destroy_filter(SessionType::Dynamic, id) {
                warn!("Failed to remove partial remote address filter {:?}: {}", id, e);
            }
        }
    }

    pub fn remove_all(&mut self) -> Result<(), FilterError> {
        let addresses: Vec<String> = self.permitted.keys().cloned().collect();
        for address in addresses {
            self.remove(&address)?;
        }
        Ok(())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.permitted.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.permitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permitted.is_empty()
    }
}
