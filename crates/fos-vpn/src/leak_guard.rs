//! IPv6 Leak Guard
//!
//! Wraps a [`VpnConnection`] and keeps IPv6 from leaking around the tunnel.
//!
//! Two strategies, picked per connection:
//!
//! - **Disable** (tunnel without IPv6): system IPv6 is switched off while
//!   leak protection is on, and switched off again on adapters that appear
//!   while connected.
//! - **Decoy** (tunnel with IPv6): synthetic addresses are assigned to the
//!   tunnel adapter so source address selection never picks a real global
//!   address of another adapter. They follow the host's address changes.
//!
//! While the guard is still preparing a connection, states reported by the
//! inner connection are replaced by a single `Pinging` state.

use crate::config::LeakGuardSettings;
use crate::connection::{
    ConnectionConfig, VpnConnection, VpnProtocol, VpnServer, VpnState, VpnStatus,
};
use crate::decoy::{
    CommandRunner, DecoyAddressGenerator, add_address_commands, delete_address_commands,
};
use crate::interfaces::{NetworkInterface, NetworkInterfaceProvider};
use crate::ipv6::SystemIpv6;
use async_trait::async_trait;
use fos_firewall::LeakProtectionStatus;
use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::sync::{Arc, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 32;

/// Operating system collaborators of the guard
pub struct Ipv6Platform {
    pub ipv6: Arc<SystemIpv6>,
    pub interfaces: Arc<dyn NetworkInterfaceProvider>,
    pub generator: Arc<dyn DecoyAddressGenerator>,
    pub commands: Arc<dyn CommandRunner>,
}

#[derive(Default)]
struct GuardState {
    servers: Vec<VpnServer>,
    config: Option<ConnectionConfig>,
    /// Preparation in progress, inner states are masked
    connect_requested: bool,
    /// Bumped by every connect so a stale preparation never connects
    attempt: u64,
    status: Option<VpnStatus>,
    last_protocol: Option<VpnProtocol>,
    gua: HashSet<Ipv6Addr>,
    decoys: Vec<Ipv6Addr>,
}

impl GuardState {
    fn decoy_strategy(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.ipv6_enabled)
    }

    fn tunnel_protocol(&self) -> Option<VpnProtocol> {
        self.last_protocol
            .or_else(|| self.config.as_ref().map(|c| c.protocol))
    }
}

struct Inner {
    origin: Arc<dyn VpnConnection>,
    platform: Ipv6Platform,
    kill_switch: Arc<dyn LeakProtectionStatus>,
    settings: watch::Receiver<LeakGuardSettings>,
    /// Serializes system IPv6 toggling
    ipv6_lock: Mutex<()>,
    /// Serializes decoy recompute-and-swap
    network_lock: Mutex<()>,
    state: std::sync::Mutex<GuardState>,
    preparing: std::sync::Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<VpnState>,
}

/// IPv6 leak protection around a VPN connection
#[derive(Clone)]
pub struct Ipv6LeakGuard {
    inner: Arc<Inner>,
}

impl Ipv6LeakGuard {
    pub fn new(
        origin: Arc<dyn VpnConnection>,
        platform: Ipv6Platform,
        kill_switch: Arc<dyn LeakProtectionStatus>,
        settings: watch::Receiver<LeakGuardSettings>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                origin,
                platform,
                kill_switch,
                settings,
                ipv6_lock: Mutex::new(()),
                network_lock: Mutex::new(()),
                state: std::sync::Mutex::new(GuardState::default()),
                preparing: std::sync::Mutex::new(None),
                events,
            }),
        }
    }

    /// Forward inner state changes, added interfaces and address changes
    /// to the guard's handlers until the sources close
    pub fn listen(&self, interfaces_added: broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        let states = self.inner.origin.subscribe();
        let address_changes = self.inner.platform.interfaces.subscribe();

        let guard = self.clone();
        let state_task = tokio::spawn(async move {
            let mut states = states;
            loop {
                match states.recv().await {
                    Ok(state) => guard.on_state_changed(state).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} VPN state changes", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let guard = self.clone();
        let added_task = tokio::spawn(async move {
            let mut added = interfaces_added;
            while recv_signal(&mut added).await {
                guard.on_interfaces_added().await;
            }
        });

        let guard = self.clone();
        let address_task = tokio::spawn(async move {
            let mut changes = address_changes;
            while recv_signal(&mut changes).await {
                guard.on_network_address_changed().await;
            }
        });

        vec![state_task, added_task, address_task]
    }

    /// Wait for the connect preparation started last, if any
    pub async fn settled(&self) {
        let handle = self.inner.lock_preparing().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Connect preparation failed: {}", e);
            }
        }
    }

    /// Decoy addresses currently remembered for the tunnel adapter
    pub fn decoys(&self) -> Vec<Ipv6Addr> {
        self.inner.lock_state().decoys.clone()
    }

    /// Handle a state change of the inner connection
    pub async fn on_state_changed(&self, state: VpnState) {
        let inner = &self.inner;
        let (decoy_strategy, apply) = {
            let mut s = inner.lock_state();
            if s.status == Some(state.status) {
                return;
            }
            s.status = Some(state.status);
            s.last_protocol = match state.status {
                VpnStatus::Connected => state.protocol,
                _ => None,
            };
            if s.connect_requested {
                drop(s);
                inner.emit_connecting();
                return;
            }
            let apply = (state.status == VpnStatus::Connected && !s.decoys.is_empty())
                .then(|| s.decoys.clone());
            (s.decoy_strategy(), apply)
        };

        let _ = inner.events.send(state.clone());

        if state.status == VpnStatus::Disconnected {
            inner.on_disconnected(decoy_strategy).await;
        }

        if !decoy_strategy {
            return;
        }
        match state.status {
            VpnStatus::Connected => {
                if let Some(decoys) = apply {
                    match inner.tunnel_interface() {
                        Some(tunnel) => inner.add_decoys(tunnel.index, &decoys).await,
                        None => warn!("Tunnel interface not found, decoy addresses not applied"),
                    }
                }
            }
            VpnStatus::Disconnected => {
                inner.lock_state().decoys.clear();
            }
            _ => {}
        }
    }

    /// New adapters come up with IPv6 bound, switch it off again
    pub async fn on_interfaces_added(&self) {
        let inner = &self.inner;
        {
            let s = inner.lock_state();
            let active = s.connect_requested || s.status == Some(VpnStatus::Connected);
            if s.decoy_strategy() || !active {
                return;
            }
        }

        let _lock = inner.ipv6_lock.lock().await;
        if !inner.platform.ipv6.is_enabled() {
            info!("Network interfaces added, disabling IPv6 on them");
            inner.platform.ipv6.disable().await;
        }
    }

    /// Follow the host's global addresses with a fresh decoy set
    pub async fn on_network_address_changed(&self) {
        let inner = &self.inner;
        let _lock = inner.network_lock.lock().await;
        {
            let s = inner.lock_state();
            if s.status != Some(VpnStatus::Connected) || !s.decoy_strategy() {
                return;
            }
        }
        let settings = inner.settings.borrow().clone();
        if !settings.ipv6_leak_protection {
            return;
        }

        let Some(tunnel) = inner.tunnel_interface() else {
            warn!("Tunnel interface not found, skipping decoy refresh");
            return;
        };
        let gua = inner.global_unicast_addresses(Some(&tunnel));

        let previous = {
            let mut s = inner.lock_state();
            if s.gua == gua {
                return;
            }
            if gua.is_empty() {
                info!("No global IPv6 addresses left, clearing decoy addresses");
                s.gua.clear();
                Some(std::mem::take(&mut s.decoys))
            } else {
                s.gua = gua.clone();
                None
            }
        };
        if let Some(stale) = previous {
            inner.remove_decoys(tunnel.index, &stale).await;
            return;
        }

        debug!("Global IPv6 addresses detected: {:?}", gua);
        let decoys = inner.generate(&settings, &gua).await;
        if decoys.is_empty() {
            warn!("No decoy addresses generated, keeping the previous set");
            return;
        }

        // New set goes in before the old one comes out
        inner.add_decoys(tunnel.index, &decoys).await;
        let old = std::mem::replace(&mut inner.lock_state().decoys, decoys.clone());
        let current: HashSet<Ipv6Addr> = decoys.into_iter().collect();
        let stale: Vec<Ipv6Addr> = old.into_iter().filter(|a| !current.contains(a)).collect();
        inner.remove_decoys(tunnel.index, &stale).await;
    }
}

#[async_trait]
impl VpnConnection for Ipv6LeakGuard {
    async fn connect(&self, servers: Vec<VpnServer>, config: ConnectionConfig) {
        let attempt = {
            let mut s = self.inner.lock_state();
            s.servers = servers;
            s.config = Some(config);
            s.connect_requested = true;
            s.attempt += 1;
            s.attempt
        };
        self.inner.emit_connecting();

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.prepare(attempt).await });
        *self.inner.lock_preparing() = Some(handle);
    }

    async fn disconnect(&self) {
        self.inner.lock_state().connect_requested = false;
        self.inner.origin.disconnect().await;
    }

    async fn reset_connection(&self) {
        self.inner.origin.reset_connection().await;
    }

    fn subscribe(&self) -> broadcast::Receiver<VpnState> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_preparing(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.preparing.lock() {
            Ok(preparing) => preparing,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn prepare(&self, attempt: u64) {
        let decoy_strategy = self.lock_state().decoy_strategy();
        if decoy_strategy {
            self.prepare_with_decoys(attempt).await;
        } else {
            self.prepare_disabling_ipv6(attempt).await;
        }
    }

    async fn prepare_disabling_ipv6(&self, attempt: u64) {
        let ipv6 = &self.platform.ipv6;
        ipv6.enable_on_tunnel_adapter().await;

        let protection = self.settings.borrow().ipv6_leak_protection;
        {
            let _lock = self.ipv6_lock.lock().await;
            if ipv6.is_enabled() && protection {
                ipv6.disable().await;
            } else if !ipv6.is_enabled() && !protection {
                ipv6.enable().await;
            }
        }

        self.connect_origin(attempt).await;
    }

    async fn prepare_with_decoys(&self, attempt: u64) {
        let ipv6 = &self.platform.ipv6;
        if !ipv6.is_enabled() {
            let _lock = self.ipv6_lock.lock().await;
            if !ipv6.is_enabled() {
                ipv6.enable().await;
            }
        }

        let settings = self.settings.borrow().clone();
        if !settings.ipv6_leak_protection {
            self.lock_state().decoys.clear();
            self.connect_origin(attempt).await;
            return;
        }

        let tunnel = self.tunnel_interface();
        let gua = self.global_unicast_addresses(tunnel.as_ref());
        if gua.is_empty() {
            debug!("No global IPv6 addresses, connecting without decoys");
            self.lock_state().decoys.clear();
            self.connect_origin(attempt).await;
            return;
        }

        debug!("Global IPv6 addresses detected: {:?}", gua);
        let decoys = self.generate(&settings, &gua).await;
        if decoys.is_empty() {
            warn!("No decoy addresses generated, connecting without them");
        }
        {
            let mut s = self.lock_state();
            s.gua = gua;
            s.decoys = decoys;
        }
        self.connect_origin(attempt).await;
    }

    async fn connect_origin(&self, attempt: u64) {
        let (servers, config) = {
            let mut s = self.lock_state();
            if s.attempt != attempt || !s.connect_requested {
                debug!("Connect request superseded, not connecting");
                return;
            }
            s.connect_requested = false;
            match s.config.clone() {
                Some(config) => (s.servers.clone(), config),
                None => return,
            }
        };
        self.origin.connect(servers, config).await;
    }

    async fn on_disconnected(&self, decoy_strategy: bool) {
        let ipv6 = &self.platform.ipv6;
        let kill_switch_on = self.kill_switch.is_leak_protection_enabled();
        if (!kill_switch_on || decoy_strategy) && !ipv6.is_enabled() {
            let _lock = self.ipv6_lock.lock().await;
            ipv6.enable().await;
        }
    }

    fn emit_connecting(&self) {
        let state = {
            let s = self.lock_state();
            let Some(server) = s.servers.first().cloned() else {
                return;
            };
            let mut state = VpnState::new(VpnStatus::Pinging).with_server(server);
            if let Some(config) = &s.config {
                state = state.with_protocol(config.protocol);
            }
            state
        };
        let _ = self.events.send(state);
    }

    fn tunnel_interface(&self) -> Option<NetworkInterface> {
        let protocol = self.lock_state().tunnel_protocol()?;
        self.platform.interfaces.tunnel_interface(protocol)
    }

    fn global_unicast_addresses(&self, tunnel: Option<&NetworkInterface>) -> HashSet<Ipv6Addr> {
        self.platform
            .interfaces
            .interfaces()
            .iter()
            .filter(|nic| tunnel.is_none_or(|t| t.id != nic.id))
            .flat_map(|nic| nic.global_unicast_addresses())
            .collect()
    }

    async fn generate(&self, settings: &LeakGuardSettings, gua: &HashSet<Ipv6Addr>) -> Vec<Ipv6Addr> {
        let exclude: Vec<Ipv6Addr> = gua.iter().copied().collect();
        self.platform
            .generator
            .generate_addresses(&settings.ipv6_fragments, &exclude, settings.max_decoy_addresses)
            .await
    }

    async fn add_decoys(&self, index: u32, addresses: &[Ipv6Addr]) {
        info!(
            "Adding {} decoy IPv6 addresses to interface with index {}",
            addresses.len(),
            index
        );
        let commands = add_address_commands(index, addresses);
        if let Err(e) = self.platform.commands.execute_multiple(commands).await {
            error!("Failed to add decoy IPv6 addresses: {}", e);
        }
    }

    async fn remove_decoys(&self, index: u32, addresses: &[Ipv6Addr]) {
        if addresses.is_empty() {
            return;
        }
        info!(
            "Deleting {} decoy IPv6 addresses from interface with index {}",
            addresses.len(),
            index
        );
        let commands = delete_address_commands(index, addresses);
        if let Err(e) = self.platform.commands.execute_multiple(commands).await {
            error!("Failed to delete decoy IPv6 addresses: {}", e);
        }
    }
}

/// Next unit signal, false once the sender is gone
async fn recv_signal(rx: &mut broadcast::Receiver<()>) -> bool {
    match rx.recv().await {
        Ok(()) => true,
        Err(RecvError::Lagged(_)) => true,
        Err(RecvError::Closed) => false,
    }
}
