//! In-memory doubles for the operating system and the tunnel

use crate::connection::{ConnectionConfig, VpnConnection, VpnProtocol, VpnServer, VpnState};
use crate::decoy::{CommandError, CommandRunner, DecoyAddressGenerator};
use crate::interfaces::{NetworkInterface, NetworkInterfaceProvider};
use crate::ipv6::{Ipv6Toggle, Ipv6ToggleError};
use async_trait::async_trait;
use fos_firewall::LeakProtectionStatus;
use std::net::Ipv6Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Interface table that tests rewrite at will
pub struct FakeInterfaces {
    interfaces: Mutex<Vec<NetworkInterface>>,
    tunnel: Mutex<Option<NetworkInterface>>,
    changes: broadcast::Sender<()>,
}

impl FakeInterfaces {
    pub fn new(interfaces: Vec<NetworkInterface>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            interfaces: Mutex::new(interfaces),
            tunnel: Mutex::new(None),
            changes,
        }
    }

    pub fn set(&self, interfaces: Vec<NetworkInterface>) {
        *self.interfaces.lock().unwrap() = interfaces;
    }

    /// Register the tunnel adapter; it is listed among the interfaces too
    pub fn set_tunnel(&self, tunnel: NetworkInterface) {
        self.interfaces.lock().unwrap().push(tunnel.clone());
        *self.tunnel.lock().unwrap() = Some(tunnel);
    }

    pub fn notify(&self) {
        let _ = self.changes.send(());
    }
}

impl NetworkInterfaceProvider for FakeInterfaces {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        self.interfaces.lock().unwrap().clone()
    }

    fn tunnel_interface(&self, _protocol: VpnProtocol) -> Option<NetworkInterface> {
        self.tunnel.lock().unwrap().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleCall {
    EnableAll,
    DisableAll,
    EnableAdapter,
}

/// Records every IPv6 toggle call
#[derive(Default)]
pub struct FakeToggle {
    calls: Mutex<Vec<(ToggleCall, String)>>,
    failing: AtomicBool,
}

impl FakeToggle {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ToggleCall> {
        self.calls.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    pub fn adapter_ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, id)| id.clone()).collect()
    }

    fn record(&self, call: ToggleCall, adapter_id: &str) -> Result<(), Ipv6ToggleError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Ipv6ToggleError::Platform(5));
        }
        self.calls.lock().unwrap().push((call, adapter_id.to_string()));
        Ok(())
    }
}

impl Ipv6Toggle for FakeToggle {
    fn enable_on_all_adapters(&self, _app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError> {
        self.record(ToggleCall::EnableAll, adapter_id)
    }

    fn disable_on_all_adapters(&self, _app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError> {
        self.record(ToggleCall::DisableAll, adapter_id)
    }

    fn enable_on_adapter(&self, _app_name: &str, adapter_id: &str) -> Result<(), Ipv6ToggleError> {
        self.record(ToggleCall::EnableAdapter, adapter_id)
    }
}

/// Inner connection that records calls; tests drive its state events
pub struct FakeConnection {
    connects: Mutex<Vec<(Vec<VpnServer>, ConnectionConfig)>>,
    disconnects: Mutex<usize>,
    resets: Mutex<usize>,
    states: broadcast::Sender<VpnState>,
}

impl Default for FakeConnection {
    fn default() -> Self {
        let (states, _) = broadcast::channel(16);
        Self {
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(0),
            resets: Mutex::new(0),
            states,
        }
    }
}

impl FakeConnection {
    pub fn connects(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock().unwrap()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn emit(&self, state: VpnState) {
        let _ = self.states.send(state);
    }
}

#[async_trait]
impl VpnConnection for FakeConnection {
    async fn connect(&self, servers: Vec<VpnServer>, config: ConnectionConfig) {
        self.connects.lock().unwrap().push((servers, config));
    }

    async fn disconnect(&self) {
        *self.disconnects.lock().unwrap() += 1;
    }

    async fn reset_connection(&self) {
        *self.resets.lock().unwrap() += 1;
    }

    fn subscribe(&self) -> broadcast::Receiver<VpnState> {
        self.states.subscribe()
    }
}

/// Hands out numbered addresses from 2001:db8:dec0::/48
#[derive(Default)]
pub struct FakeGenerator {
    generation: Mutex<u16>,
    requests: Mutex<Vec<Vec<Ipv6Addr>>>,
    count: Mutex<Option<usize>>,
}

impl FakeGenerator {
    /// Force the number of generated addresses
    pub fn set_count(&self, count: usize) {
        *self.count.lock().unwrap() = Some(count);
    }

    /// `exclude` lists seen by each generation
    pub fn requests(&self) -> Vec<Vec<Ipv6Addr>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecoyAddressGenerator for FakeGenerator {
    async fn generate_addresses(
        &self,
        _fragments: &[String],
        exclude: &[Ipv6Addr],
        max_count: usize,
    ) -> Vec<Ipv6Addr> {
        let mut excluded = exclude.to_vec();
        excluded.sort();
        self.requests.lock().unwrap().push(excluded);

        let mut generation = self.generation.lock().unwrap();
        *generation += 1;
        let count = self.count.lock().unwrap().unwrap_or(2).min(max_count);
        (0..count)
            .map(|i| Ipv6Addr::new(0x2001, 0xdb8, 0xdec0, *generation, 0, 0, 0, i as u16 + 1))
            .collect()
    }
}

/// Keeps every command batch
#[derive(Default)]
pub struct RecordingRunner {
    batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.batches().concat()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn execute_multiple(&self, commands: Vec<String>) -> Result<(), CommandError> {
        self.batches.lock().unwrap().push(commands);
        Ok(())
    }
}

/// Kill switch state set by the test
#[derive(Default)]
pub struct FakeKillSwitch(pub AtomicBool);

impl FakeKillSwitch {
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl LeakProtectionStatus for FakeKillSwitch {
    fn is_leak_protection_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
