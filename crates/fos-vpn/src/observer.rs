//! Network Change Observer
//!
//! Turns raw "address changed" notifications into a "new interface
//! appeared" signal. Removed interfaces are ignored, and the first
//! notification after startup only records a baseline.

use crate::interfaces::NetworkInterfaceProvider;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Watches the interface table for newly added adapters
pub struct NetworkChangeObserver {
    interfaces: Arc<dyn NetworkInterfaceProvider>,
    known: Mutex<HashSet<String>>,
    added: broadcast::Sender<()>,
}

impl NetworkChangeObserver {
    pub fn new(interfaces: Arc<dyn NetworkInterfaceProvider>) -> Self {
        let (added, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            interfaces,
            known: Mutex::new(HashSet::new()),
            added,
        }
    }

    /// Subscribe to "interfaces added"
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.added.subscribe()
    }

    /// Handle one address change, returning true if new interfaces appeared
    pub fn on_address_changed(&self) -> bool {
        let adapters = self.interfaces.interfaces();
        if adapters.is_empty() {
            debug!("Interface table is empty, keeping previous snapshot");
            return false;
        }

        let current: HashSet<String> = adapters
            .into_iter()
            .filter(|a| !a.is_loopback)
            .map(|a| a.id)
            .collect();

        let mut known = match self.known.lock() {
            Ok(known) => known,
            Err(poisoned) => poisoned.into_inner(),
        };
        let added = !known.is_empty() && !current.is_subset(&known);
        *known = current;
        drop(known);

        if added {
            info!("New network interfaces detected");
            let _ = self.added.send(());
        }
        added
    }

    /// Feed provider notifications into the observer until the provider goes away
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.interfaces.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) => {
                        self.on_address_changed();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} address change notifications", skipped);
                        self.on_address_changed();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
