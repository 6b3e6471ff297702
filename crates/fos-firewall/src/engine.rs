//! Firewall Engine
//!
//! Keeps the OS packet filter table in line with the VPN lifecycle.
//!
//! # Filter set
//!
//! ```text
//! weight 4  DHCP, tunnel interface, own executables, ICMPv6 discovery, DNS callout
//! weight 3  block UDP/TCP 53 (v4 + v6)
//! weight 2  loopback, private networks (LAN access only)
//! weight 1  server permit, anti-spoof, block all IPv4/IPv6
//! ```
//!
//! The first `enable` installs the whole set. Later calls while enabled are
//! diffed against the last applied [`FirewallParams`] and only the groups
//! whose inputs changed are rebuilt. Filter platform errors never escape a
//! public operation: they are logged and whatever is already installed
//! stays in place.

use crate::config::FirewallConfig;
use crate::item::{FirewallItem, FirewallItems, ItemType};
use crate::layer::IpLayer;
use crate::params::{DnsBlockMode, FirewallParams, SessionType};
use crate::provider::{
    CalloutDriver, DisplayData, DnsRedirectProvider, FilterAction, FilterError, FilterId,
    FilterSpec, IpNetwork, Layer, NdpMessage, PacketFilterProvider,
};
use crate::rotation::{ServerAddressFilterCollection, ServerAddressRotation};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

const DNS_PORT: u16 = 53;
const DHCP_PORT: u16 = 67;

const PERMIT_WEIGHT: u32 = 4;
const DNS_BLOCK_WEIGHT: u32 = 3;
const LOCAL_TRAFFIC_WEIGHT: u32 = 2;
const LOWEST_WEIGHT: u32 = 1;

/// Networks permitted when LAN access is on
fn private_networks() -> [IpNetwork; 8] {
    [
        IpNetwork::v4(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 0, 0)),
        IpNetwork::v4(Ipv4Addr::new(169, 254, 0, 0), Ipv4Addr::new(255, 255, 0, 0)),
        IpNetwork::v4(Ipv4Addr::new(172, 16, 0, 0), Ipv4Addr::new(255, 240, 0, 0)),
        IpNetwork::v4(Ipv4Addr::new(192, 168, 0, 0), Ipv4Addr::new(255, 255, 0, 0)),
        IpNetwork::v4(Ipv4Addr::new(224, 0, 0, 0), Ipv4Addr::new(240, 0, 0, 0)),
        IpNetwork::v4(Ipv4Addr::BROADCAST, Ipv4Addr::BROADCAST),
        IpNetwork::v6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
        IpNetwork::v6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    ]
}

/// Filter attributes minus the layer
struct Rule {
    display: DisplayData,
    action: FilterAction,
    weight: u32,
    persistent: bool,
}

impl Rule {
    fn at(&self, layer: Layer) -> FilterSpec {
        FilterSpec {
            display: self.display.clone(),
            action: self.action,
            layer,
            weight: self.weight,
            persistent: self.persistent,
        }
    }
}

/// Answers whether the kill switch is currently on
pub trait LeakProtectionStatus: Send + Sync {
    fn is_leak_protection_enabled(&self) -> bool;
}

impl LeakProtectionStatus for Mutex<FirewallEngine> {
    fn is_leak_protection_enabled(&self) -> bool {
        // A poisoned engine may have left filters installed
        self.lock()
            .map(|engine| engine.is_leak_protection_enabled())
            .unwrap_or(true)
    }
}

/// Kill switch and DNS leak protection
pub struct FirewallEngine {
    provider: Arc<dyn PacketFilterProvider>,
    dns_redirect: Arc<dyn DnsRedirectProvider>,
    driver: Arc<dyn CalloutDriver>,
    config: FirewallConfig,
    layers: IpLayer,
    last_params: FirewallParams,
    leak_protection_enabled: bool,
    dns_callout_added: bool,
    items: FirewallItems,
    rotation: ServerAddressRotation,
}

impl FirewallEngine {
    pub fn new(
        provider: Arc<dyn PacketFilterProvider>,
        dns_redirect: Arc<dyn DnsRedirectProvider>,
        driver: Arc<dyn CalloutDriver>,
        config: FirewallConfig,
    ) -> Self {
        Self {
            provider,
            dns_redirect,
            driver,
            config,
            layers: IpLayer::default(),
            last_params: FirewallParams::empty(),
            leak_protection_enabled: false,
            dns_callout_added: false,
            items: FirewallItems::new(),
            rotation: ServerAddressRotation::new(),
        }
    }

    /// Override the layers per address family
    pub fn with_layers(mut self, layers: IpLayer) -> Self {
        self.layers = layers;
        self
    }

    pub fn is_leak_protection_enabled(&self) -> bool {
        self.leak_protection_enabled
    }

    /// LAN access of the last applied parameters
    pub fn is_lan_access_enabled(&self) -> bool {
        self.last_params.lan_access
    }

    pub fn last_params(&self) -> &FirewallParams {
        &self.last_params
    }

    pub fn items(&self) -> &FirewallItems {
        &self.items
    }

    pub fn rotation(&self) -> &ServerAddressRotation {
        &self.rotation
    }

    /// Recover state left by a previous run
    ///
    /// Filters in the permanent sublayer mean the kill switch survived a
    /// crash or reboot. Leak protection is marked enabled without touching
    /// the block filters; only the app permits are recreated because the
    /// executable paths may have changed with an update.
    pub fn start(&mut self) {
        let count = match self.provider.filter_count(SessionType::Permanent) {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to count permanent filters: {}", e);
                return;
            }
        };

        if count == 0 {
            return;
        }

        info!("Detected {} permanent filters, recreating app permits", count);

        self.last_params = FirewallParams {
            persistent: true,
            session_type: SessionType::Permanent,
            permanent_state_after_reboot: true,
            ..FirewallParams::empty()
        };
        self.leak_protection_enabled = true;

        let name = self.config.permit_app_filter_name();
        let params = self.last_params.clone();
        let result = self
            .provider
            .destroy_filters_by_name(SessionType::Permanent, &name)
            .and_then(|()| self.permit_from_processes(PERMIT_WEIGHT, &params));

        if let Err(e) = result {
            error!("Failed to recreate app permit filters: {}", e);
        }
    }

    /// Turn the kill switch on, or update it in place if already on
    pub fn enable(&mut self, params: FirewallParams) {
        if self.leak_protection_enabled {
            self.apply_change(params);
            return;
        }

        if let Err(e) = self.driver.start() {
            error!("Failed to start callout driver: {}", e);
        }
        log_failure("permit server address", self.permit_server_address(&params));
        self.apply_filters(&params);
        self.set_last_params(params);
    }

    /// Remove every filter and reset all state
    pub fn disable(&mut self) {
        info!("Restoring internet");

        self.dns_redirect.delete_rule();
        log_failure(
            "destroy dynamic filters",
            self.provider.destroy_all_filters(SessionType::Dynamic),
        );
        log_failure(
            "destroy permanent filters",
            self.provider.destroy_all_filters(SessionType::Permanent),
        );

        self.rotation.clear();
        self.items.clear();
        self.leak_protection_enabled = false;
        self.dns_callout_added = false;
        if let Err(e) = self.driver.stop() {
            error!("Failed to stop callout driver: {}", e);
        }
        self.last_params = FirewallParams::empty();

        info!("Internet restored");
    }

    fn apply_filters(&mut self, params: &FirewallParams) {
        info!("Blocking internet");

        match self.install_filter_set(params) {
            Ok(()) => {
                self.leak_protection_enabled = true;
                info!("Internet blocked");
            }
            Err(e) => error!("An error occurred when applying the network filters: {}", e),
        }
    }

    fn install_filter_set(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        self.enable_dns_leak_protection(params)?;
        if !params.dns_leak_only {
            self.enable_base_leak_protection(params)?;
        }
        Ok(())
    }

    fn apply_change(&mut self, mut params: FirewallParams) {
        if self.last_params.permanent_state_after_reboot {
            self.handle_permanent_state_after_reboot(&params);
            self.set_last_params(params);
            return;
        }

        if params.interface_index == 0 {
            params.interface_index = self.last_params.interface_index;
        }

        let last = self.last_params.clone();
        let session_changed = params.session_type != last.session_type;

        if session_changed {
            debug!("Session type changed to {:?}", params.session_type);
            let previous = self.items.take(&[
                ItemType::VariableFilter,
                ItemType::LocalNetworkFilter,
                ItemType::PermitInterfaceFilter,
            ]);
            self.apply_filters(&params);
            log_failure("remove previous session filters", self.destroy_items(&previous));
        }

        let mut dns_mode_recreated = false;
        if params.add_interface_filters
            && params.has_interface()
            && params.interface_or_dns_changed(&last)
        {
            // Turning DNS-leak-only off rebuilds the base set, interface permits included
            let base_rebuilt = params.dns_leak_only != last.dns_leak_only;
            if !session_changed && !params.dns_leak_only && !base_rebuilt {
                let previous = self.items.take(&[ItemType::PermitInterfaceFilter]);
                log_failure(
                    "permit tunnel interface",
                    self.permit_from_network_interface(PERMIT_WEIGHT, &params),
                );
                log_failure("remove previous interface filters", self.destroy_items(&previous));
            }

            let previous = self.items.take(&[ItemType::DnsCalloutFilter, ItemType::DnsFilter]);
            self.dns_callout_added = false;
            self.dns_redirect.delete_rule();
            log_failure("create DNS block", self.create_dns_block(&params));
            log_failure("remove previous DNS callout", self.destroy_items(&previous));
            dns_mode_recreated = true;
        }

        if !session_changed {
            if params.dns_leak_only != last.dns_leak_only {
                log_failure("toggle DNS leak only", self.toggle_dns_leak_only(&params));
            } else if params.lan_access != last.lan_access && !params.dns_leak_only {
                log_failure("toggle LAN access", self.toggle_lan_access(&params));
            }
        }

        log_failure("permit server address", self.permit_server_address(&params));

        let anti_spoof_stale = params.server_ip != last.server_ip
            || params.persistent != last.persistent
            || self.items.count(ItemType::BlockOutsideOpenVpnFilter) == 0;
        if anti_spoof_stale {
            log_failure("block outside tunnel app", self.block_outside_tunnel_app(&params));
        }

        if !dns_mode_recreated && params.dns_block_mode != last.dns_block_mode {
            debug!(
                "Tunnel interface unknown, keeping DNS block mode {:?}",
                last.dns_block_mode
            );
            params.dns_block_mode = last.dns_block_mode;
        }

        self.set_last_params(params);
    }

    fn toggle_dns_leak_only(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        if params.dns_leak_only {
            let previous = self.items.take(&[
                ItemType::VariableFilter,
                ItemType::LocalNetworkFilter,
                ItemType::PermitInterfaceFilter,
                ItemType::BlockOutsideOpenVpnFilter,
            ]);
            // Port 53 blocks are tracked with the base set, put them back first
            self.block_dns(DNS_BLOCK_WEIGHT, params)?;
            self.destroy_items(&previous)
        } else {
            let previous = self.items.take(&[ItemType::VariableFilter]);
            self.enable_base_leak_protection(params)?;
            self.block_dns(DNS_BLOCK_WEIGHT, params)?;
            self.destroy_items(&previous)
        }
    }

    fn toggle_lan_access(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        if params.lan_access {
            self.permit_private_network(LOCAL_TRAFFIC_WEIGHT, params)
        } else {
            let previous = self.items.take(&[ItemType::LocalNetworkFilter]);
            self.destroy_items(&previous)
        }
    }

    fn set_last_params(&mut self, mut params: FirewallParams) {
        // WireGuard only learns the adapter index after connecting
        if params.interface_index == 0 && self.last_params.interface_index > 0 {
            params.interface_index = self.last_params.interface_index;
        }
        self.last_params = params;
    }

    fn handle_permanent_state_after_reboot(&mut self, params: &FirewallParams) {
        info!("Restoring filters that do not survive a reboot");

        if let Err(e) = self.driver.start() {
            error!("Failed to start callout driver: {}", e);
        }
        log_failure("create DNS block", self.create_dns_block(params));
        log_failure(
            "permit tunnel interface",
            self.permit_from_network_interface(PERMIT_WEIGHT, params),
        );
        log_failure("permit server address", self.permit_server_address(params));
    }

    fn enable_dns_leak_protection(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        self.block_dns(DNS_BLOCK_WEIGHT, params)?;
        self.create_dns_block(params)
    }

    fn enable_base_leak_protection(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        self.permit_dhcp(PERMIT_WEIGHT, params)?;
        self.permit_from_network_interface(PERMIT_WEIGHT, params)?;
        self.permit_from_processes(PERMIT_WEIGHT, params)?;
        self.permit_network_discovery(PERMIT_WEIGHT, params)?;

        self.permit_loopback(LOCAL_TRAFFIC_WEIGHT, params)?;
        self.permit_private_network(LOCAL_TRAFFIC_WEIGHT, params)?;

        self.block_all(LOWEST_WEIGHT, params)?;
        self.block_outside_tunnel_app(params)
    }

    fn block_dns(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        let udp = self.rule("block DNS", "Block UDP 53 port", FilterAction::HardBlock, weight, params.persistent);
        let tcp = self.rule("block DNS", "Block TCP 53 port", FilterAction::HardBlock, weight, params.persistent);
        let session = params.session_type;

        for layers in [self.layers.ipv4().to_vec(), self.layers.ipv6().to_vec()] {
            self.install(ItemType::VariableFilter, session, &layers, &udp, |p, spec| {
                p.create_remote_udp_port_filter(session, spec, DNS_PORT)
            })?;
            self.install(ItemType::VariableFilter, session, &layers, &tcp, |p, spec| {
                p.create_remote_tcp_port_filter(session, spec, DNS_PORT)
            })?;
        }
        Ok(())
    }

    fn create_dns_block(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        match params.dns_block_mode {
            DnsBlockMode::Nrpt => {
                if !self.dns_redirect.create_rule() {
                    warn!("NRPT rule failed to be created, creating DNS callout filter");
                    self.create_dns_callout(params)?;
                }
            }
            DnsBlockMode::Callout => {
                info!("DNS block mode is callout, creating DNS callout filter");
                self.create_dns_callout(params)?;
            }
            DnsBlockMode::Disabled => {
                info!("DNS block mode is disabled, no DNS redirection");
            }
        }
        Ok(())
    }

    fn create_dns_callout(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        if self.dns_callout_added || !params.add_interface_filters {
            return Ok(());
        }
        if !params.has_interface() {
            debug!("Tunnel interface unknown, skipping DNS callout");
            return Ok(());
        }

        let session = SessionType::Dynamic;
        let callout = self.rule("block DNS", "Block outside DNS", FilterAction::HardBlock, PERMIT_WEIGHT, false);
        let index = params.interface_index;
        self.install(
            ItemType::DnsCalloutFilter,
            session,
            &[Layer::OutboundIpPacketV4],
            &callout,
            |p, spec| p.block_outside_dns(session, spec, index),
        )?;

        let permit = self.rule(
            "DNS filter",
            "Permit UDP 53 port so it can be redirected at network layer",
            FilterAction::HardPermit,
            PERMIT_WEIGHT,
            false,
        );
        let layers = self.layers.ipv4().to_vec();
        self.install(ItemType::DnsFilter, session, &layers, &permit, |p, spec| {
            p.create_remote_udp_port_filter(session, spec, DNS_PORT)
        })?;

        self.dns_callout_added = true;
        Ok(())
    }

    fn permit_dhcp(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        let session = params.session_type;
        let v4 = self.rule("permit DHCP IPv4", "Permit 67 UDP port", FilterAction::SoftPermit, weight, params.persistent);
        let layers = self.layers.ipv4().to_vec();
        self.install(ItemType::VariableFilter, session, &layers, &v4, |p, spec| {
            p.create_remote_udp_port_filter(session, spec, DHCP_PORT)
        })?;

        let outbound = self.rule("permit outbound DHCP IPv6", "", FilterAction::SoftPermit, weight, params.persistent);
        self.install(ItemType::VariableFilter, session, &[Layer::AppAuthConnectV6], &outbound, |p, spec| {
            p.permit_outbound_ipv6_dhcp(session, spec)
        })?;

        let inbound = self.rule("permit inbound DHCP IPv6", "", FilterAction::SoftPermit, weight, params.persistent);
        self.install(ItemType::VariableFilter, session, &[Layer::AppAuthRecvAcceptV6], &inbound, |p, spec| {
            p.permit_inbound_ipv6_dhcp(session, spec)
        })
    }

    fn permit_from_network_interface(
        &mut self,
        weight: u32,
        params: &FirewallParams,
    ) -> Result<(), FilterError> {
        if !params.add_interface_filters {
            return Ok(());
        }
        if !params.has_interface() {
            debug!("Tunnel interface unknown, skipping interface permit");
            return Ok(());
        }

        // Never persistent: the index can change after a reboot
        let rule = self.rule("permit VPN tunnel", "Permit tunnel interface traffic", FilterAction::SoftPermit, weight, false);
        let session = params.session_type;
        let index = params.interface_index;

        for layers in [self.layers.ipv4().to_vec(), self.layers.ipv6().to_vec()] {
            let result = self.install(ItemType::PermitInterfaceFilter, session, &layers, &rule, |p, spec| {
                p.create_net_interface_filter(session, spec, index)
            });
            match result {
                Err(FilterError::AdapterNotFound(index)) => {
                    error!("Interface with index {} was not found", index);
                    return Ok(());
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn permit_from_processes(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        let session = params.session_type;
        let display = DisplayData::new(
            self.config.permit_app_filter_name(),
            format!("Permit {} to bypass VPN tunnel", self.config.app_name),
        );
        let rule = Rule {
            display,
            action: FilterAction::HardPermit,
            weight,
            persistent: params.persistent,
        };
        let layers = self.layers.ipv4().to_vec();
        let apps: Vec<_> = self
            .config
            .permitted_apps()
            .iter()
            .map(|p| p.to_path_buf())
            .collect();

        for app in apps {
            self.install(ItemType::VariableFilter, session, &layers, &rule, |p, spec| {
                p.create_app_filter(session, spec, &app)
            })?;
        }
        Ok(())
    }

    fn permit_network_discovery(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        use NdpMessage::*;

        let session = params.session_type;
        let messages: [(NdpMessage, &[Layer]); 5] = [
            (RouterSolicitation, &[Layer::AppAuthConnectV6]),
            (RouterAdvertisement, &[Layer::AppAuthRecvAcceptV6]),
            (NeighborSolicitation, &[Layer::AppAuthConnectV6, Layer::AppAuthRecvAcceptV6]),
            (NeighborAdvertisement, &[Layer::AppAuthConnectV6, Layer::AppAuthRecvAcceptV6]),
            (Redirect, &[Layer::AppAuthRecvAcceptV6]),
        ];

        for (message, layers) in messages {
            let name = format!("permit ICMP type {}, code 0", message.icmp_type());
            let rule = self.rule(&name, "", FilterAction::HardPermit, weight, params.persistent);
            self.install(ItemType::VariableFilter, session, layers, &rule, |p, spec| {
                p.permit_ndp_message(session, spec, message)
            })?;
        }
        Ok(())
    }

    fn permit_loopback(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        let session = params.session_type;
        let v4 = self.rule("permit IPv4 loopback", "Permit IPv4 loopback traffic", FilterAction::HardPermit, weight, params.persistent);
        let v6 = self.rule("permit IPv6 loopback", "Permit IPv6 loopback traffic", FilterAction::HardPermit, weight, params.persistent);

        let layers = self.layers.ipv4().to_vec();
        self.install(ItemType::VariableFilter, session, &layers, &v4, |p, spec| {
            p.create_loopback_filter(session, spec)
        })?;
        let layers = self.layers.ipv6().to_vec();
        self.install(ItemType::VariableFilter, session, &layers, &v6, |p, spec| {
            p.create_loopback_filter(session, spec)
        })
    }

    fn permit_private_network(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        if !params.lan_access {
            return Ok(());
        }

        let session = params.session_type;
        let rule = self.rule("permit private network", "", FilterAction::HardPermit, weight, params.persistent);

        for network in private_networks() {
            let layers = self.layers.for_network(&network).to_vec();
            self.install(ItemType::LocalNetworkFilter, session, &layers, &rule, |p, spec| {
                p.create_remote_network_filter(session, spec, network)
            })?;
        }
        Ok(())
    }

    fn block_all(&mut self, weight: u32, params: &FirewallParams) -> Result<(), FilterError> {
        let session = params.session_type;
        let v4 = self.rule("block IPv4", "Block all IPv4 traffic", FilterAction::SoftBlock, weight, params.persistent);
        let v6 = self.rule("block IPv6", "Block all IPv6 traffic", FilterAction::SoftBlock, weight, params.persistent);

        let layers = self.layers.ipv4().to_vec();
        self.install(ItemType::VariableFilter, session, &layers, &v4, |p, spec| {
            p.create_layer_filter(session, spec)
        })?;
        let layers = self.layers.ipv6().to_vec();
        self.install(ItemType::VariableFilter, session, &layers, &v6, |p, spec| {
            p.create_layer_filter(session, spec)
        })
    }

    /// Only the tunnel executable may talk to the VPN server
    fn block_outside_tunnel_app(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        let Some(server_ip) = params.server_ip else {
            return Ok(());
        };
        if params.dns_leak_only {
            return Ok(());
        }

        let previous = self.items.take(&[ItemType::BlockOutsideOpenVpnFilter]);
        self.destroy_items(&previous)?;

        let session = params.session_type;
        let rule = self.rule(
            "block outside OpenVPN traffic",
            "Block outgoing traffic to VPN server unless the process is the tunnel",
            FilterAction::HardBlock,
            LOWEST_WEIGHT,
            params.persistent,
        );
        let tunnel_app = self.config.openvpn_exe.clone();
        let layers = self.layers.ipv4().to_vec();
        self.install(ItemType::BlockOutsideOpenVpnFilter, session, &layers, &rule, |p, spec| {
            p.block_outside_tunnel_app(session, spec, &tunnel_app, IpAddr::V4(server_ip))
        })
    }

    fn permit_server_address(&mut self, params: &FirewallParams) -> Result<(), FilterError> {
        let Some(server_ip) = params.server_ip else {
            return Ok(());
        };
        let session = params.session_type;

        if self.rotation.promote(server_ip, session) {
            debug!("Server {} already permitted", server_ip);
        } else {
            let rule = self.rule("permit VPN server", "Permit server ip", FilterAction::HardPermit, LOWEST_WEIGHT, false);
            let mut filter_ids = Vec::new();
            let mut failure = None;

            for &layer in self.layers.ipv4() {
                match self.provider.create_remote_ipv4_filter(session, &rule.at(layer), server_ip) {
                    Ok(id) => filter_ids.push(id),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if filter_ids.is_empty() {
                if let Some(e) = failure {
                    return Err(e);
                }
            }

            let evicted = self.rotation.push(ServerAddressFilterCollection {
                server_ip,
                session_type: session,
                filter_ids,
            });
            for collection in evicted {
                debug!("Removing permit for previous server {}", collection.server_ip);
                self.destroy_ids(collection.session_type, &collection.filter_ids)?;
            }

            if let Some(e) = failure {
                return Err(e);
            }
        }

        let last_session = self.last_params.session_type;
        if last_session != session {
            for collection in self.rotation.take_session(last_session) {
                self.destroy_ids(collection.session_type, &collection.filter_ids)?;
            }
        }
        Ok(())
    }

    fn rule(
        &self,
        name: &str,
        description: &str,
        action: FilterAction,
        weight: u32,
        persistent: bool,
    ) -> Rule {
        Rule {
            display: DisplayData::new(self.config.filter_name(name), description),
            action,
            weight,
            persistent,
        }
    }

    /// Create one filter per layer and track it
    fn install<F>(
        &mut self,
        item_type: ItemType,
        session: SessionType,
        layers: &[Layer],
        rule: &Rule,
        create: F,
    ) -> Result<(), FilterError>
    where
        F: Fn(&dyn PacketFilterProvider, &FilterSpec) -> Result<FilterId, FilterError>,
    {
        for &layer in layers {
            let id = create(self.provider.as_ref(), &rule.at(layer))?;
            debug!("Created {:?} filter {} on {:?}", item_type, id, layer);
            self.items.push(FirewallItem::new(id, item_type, session));
        }
        Ok(())
    }

    fn destroy_items(&self, items: &[FirewallItem]) -> Result<(), FilterError> {
        for item in items {
            self.provider.destroy_filter(item.session, item.id)?;
        }
        Ok(())
    }

    fn destroy_ids(&self, session: SessionType, ids: &[FilterId]) -> Result<(), FilterError> {
        for &id in ids {
            self.provider.destroy_filter(session, id)?;
        }
        Ok(())
    }
}

fn log_failure(step: &str, result: Result<(), FilterError>) {
    if let Err(e) = result {
        error!("Failed to {}: {}", step, e);
    }
}
