//! In-memory doubles for the filtering platform

use crate::params::SessionType;
use crate::provider::{
    CalloutDriver, DnsRedirectProvider, FilterError, FilterId, FilterSpec, IpNetwork, NdpMessage,
    PacketFilterProvider,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// What a recorded filter matches on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    RemoteIpv4(Ipv4Addr),
    RemoteNetwork(IpNetwork),
    NetInterface(u32),
    App(PathBuf),
    Loopback,
    Layer,
    UdpPort(u16),
    TcpPort(u16),
    BlockOutsideTunnelApp(IpAddr),
    BlockOutsideDns(u32),
    OutboundIpv6Dhcp,
    InboundIpv6Dhcp,
    Ndp(NdpMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFilter {
    pub id: FilterId,
    pub session: SessionType,
    pub kind: FilterKind,
    pub spec: FilterSpec,
}

#[derive(Default)]
struct State {
    next_id: u64,
    installed: Vec<RecordedFilter>,
    destroyed: Vec<FilterId>,
    created: usize,
}

/// Filter provider that keeps installed filters in memory
#[derive(Default)]
pub struct RecordingProvider {
    state: Mutex<State>,
    failing: AtomicBool,
    failing_destroys: AtomicUsize,
    creates_before_failure: Mutex<Option<usize>>,
    missing_adapter: AtomicBool,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let `count` more create calls succeed, then fail every one after
    pub fn fail_creates_after(&self, count: usize) {
        *self.creates_before_failure.lock().unwrap() = Some(count);
    }

    /// Make the next `count` destroy calls fail
    pub fn fail_destroys(&self, count: usize) {
        self.failing_destroys.store(count, Ordering::SeqCst);
    }

    /// Make interface filters report a missing adapter
    pub fn set_missing_adapter(&self, missing: bool) {
        self.missing_adapter.store(missing, Ordering::SeqCst);
    }

    /// Pretend filters survived in a sublayer
    pub fn preinstall(&self, session: SessionType, spec: FilterSpec, count: usize) {
        for _ in 0..count {
            self.record(session, &spec, FilterKind::Layer).unwrap();
        }
    }

    pub fn installed(&self) -> Vec<RecordedFilter> {
        self.state.lock().unwrap().installed.clone()
    }

    pub fn installed_in(&self, session: SessionType) -> Vec<RecordedFilter> {
        self.installed()
            .into_iter()
            .filter(|f| f.session == session)
            .collect()
    }

    pub fn installed_ids(&self) -> Vec<FilterId> {
        self.installed().iter().map(|f| f.id).collect()
    }

    pub fn count_where(&self, pred: impl Fn(&RecordedFilter) -> bool) -> usize {
        self.installed().iter().filter(|f| pred(f)).count()
    }

    pub fn destroyed(&self) -> Vec<FilterId> {
        self.state.lock().unwrap().destroyed.clone()
    }

    /// Total number of successful create calls
    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    fn record(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        kind: FilterKind,
    ) -> Result<FilterId, FilterError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FilterError::Platform("injected failure".to_string()));
        }
        if let Some(left) = self.creates_before_failure.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(FilterError::Platform("injected failure".to_string()));
            }
            *left -= 1;
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.created += 1;
        let id = FilterId(state.next_id);
        state.installed.push(RecordedFilter {
            id,
            session,
            kind,
            spec: spec.clone(),
        });
        Ok(id)
    }
}

impl PacketFilterProvider for RecordingProvider {
    fn create_remote_ipv4_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        addr: Ipv4Addr,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::RemoteIpv4(addr))
    }

    fn create_remote_network_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        network: IpNetwork,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::RemoteNetwork(network))
    }

    fn create_net_interface_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        interface_index: u32,
    ) -> Result<FilterId, FilterError> {
        if self.missing_adapter.load(Ordering::SeqCst) {
            return Err(FilterError::AdapterNotFound(interface_index));
        }
        self.record(session, spec, FilterKind::NetInterface(interface_index))
    }

    fn create_app_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        app_path: &Path,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::App(app_path.to_path_buf()))
    }

    fn create_loopback_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::Loopback)
    }

    fn create_layer_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::Layer)
    }

    fn create_remote_udp_port_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        port: u16,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::UdpPort(port))
    }

    fn create_remote_tcp_port_filter(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        port: u16,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::TcpPort(port))
    }

    fn block_outside_tunnel_app(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        _tunnel_app: &Path,
        server: IpAddr,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::BlockOutsideTunnelApp(server))
    }

    fn block_outside_dns(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        interface_index: u32,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::BlockOutsideDns(interface_index))
    }

    fn permit_outbound_ipv6_dhcp(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::OutboundIpv6Dhcp)
    }

    fn permit_inbound_ipv6_dhcp(
        &self,
        session: SessionType,
        spec: &FilterSpec,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::InboundIpv6Dhcp)
    }

    fn permit_ndp_message(
        &self,
        session: SessionType,
        spec: &FilterSpec,
        message: NdpMessage,
    ) -> Result<FilterId, FilterError> {
        self.record(session, spec, FilterKind::Ndp(message))
    }

    fn destroy_filter(&self, session: SessionType, id: FilterId) -> Result<(), FilterError> {
        let pending = self.failing_destroys.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_destroys.store(pending - 1, Ordering::SeqCst);
            return Err(FilterError::Platform("injected failure".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state
            .installed
            .iter()
            .position(|f| f.id == id && f.session == session)
        {
            state.installed.remove(pos);
            state.destroyed.push(id);
        }
        Ok(())
    }

    fn destroy_all_filters(&self, session: SessionType) -> Result<(), FilterError> {
        let mut state = self.state.lock().unwrap();
        let (gone, kept): (Vec<_>, Vec<_>) = state
            .installed
            .drain(..)
            .partition(|f| f.session == session);
        state.installed = kept;
        state.destroyed.extend(gone.iter().map(|f| f.id));
        Ok(())
    }

    fn destroy_filters_by_name(&self, session: SessionType, name: &str) -> Result<(), FilterError> {
        let mut state = self.state.lock().unwrap();
        let (gone, kept): (Vec<_>, Vec<_>) = state
            .installed
            .drain(..)
            .partition(|f| f.session == session && f.spec.display.name == name);
        state.installed = kept;
        state.destroyed.extend(gone.iter().map(|f| f.id));
        Ok(())
    }

    fn filter_count(&self, session: SessionType) -> Result<usize, FilterError> {
        Ok(self.installed_in(session).len())
    }
}

/// DNS redirect double with a switchable outcome
pub struct RecordingDnsRedirect {
    succeed: AtomicBool,
    pub created: AtomicUsize,
    pub deleted: AtomicUsize,
}

impl RecordingDnsRedirect {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed: AtomicBool::new(succeed),
            created: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }
}

impl DnsRedirectProvider for RecordingDnsRedirect {
    fn create_rule(&self) -> bool {
        let ok = self.succeed.load(Ordering::SeqCst);
        if ok {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }

    fn delete_rule(&self) -> bool {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Driver double counting start/stop calls
#[derive(Default)]
pub struct RecordingDriver {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl RecordingDriver {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl CalloutDriver for RecordingDriver {
    fn start(&self) -> Result<(), FilterError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), FilterError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
