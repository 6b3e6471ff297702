//! NAT-PMP Client
//!
//! Negotiates one TCP and one UDP port mapping with the default gateway and
//! keeps it alive until stopped.
//!
//! # State machine
//!
//! ```text
//! Stopped ─▶ Starting ─▶ HelloCommunication ─▶ PortMappingCommunication ─▶ SleepingUntilRefresh
//!                                                       ▲                         │
//!                                                       └──── renewal (lease/2) ──┘
//! stop(): ─▶ DestroyPortMappingCommunication ─▶ Stopped
//! any failure ─▶ Error
//! ```
//!
//! Every transition is published on a broadcast channel. Errors never reach
//! the caller of `start`/`stop`; they only show up as the `Error` state.

use crate::config::NatPmpConfig;
use crate::error::NatPmpError;
use crate::gateway::{GatewayProvider, IssueReporter};
use crate::message::{
    HelloQuery, HelloReply, MappingProtocol, PortMappingQuery, PortMappingReply,
    result_code_description,
};
use crate::state::{MappedPort, PortForwardingState, PortMappingStatus, TemporaryMappedPort};
use crate::transport::PmpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 32;

/// Shortest renewal delay, guards against zero-lifetime grants
const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Session {
    /// Cancelled by stop or on failure
    run_token: Option<CancellationToken>,
    /// Alive while a stop is in progress
    stop_token: Option<CancellationToken>,
    mapped_port: Option<TemporaryMappedPort>,
    last_state: Option<PortForwardingState>,
    renewal: Option<JoinHandle<()>>,
    hello: Option<HelloReply>,
}

struct Inner {
    config: NatPmpConfig,
    transport: Arc<dyn PmpTransport>,
    gateway: Arc<dyn GatewayProvider>,
    reporter: Arc<dyn IssueReporter>,
    session: Mutex<Session>,
    events: broadcast::Sender<PortForwardingState>,
}

/// Outcome of a successful mapping round
struct Mapping {
    port: MappedPort,
    renew_after: Duration,
}

/// NAT-PMP port mapping client
#[derive(Clone)]
pub struct NatPmpClient {
    inner: Arc<Inner>,
}

impl NatPmpClient {
    pub fn new(
        config: NatPmpConfig,
        transport: Arc<dyn PmpTransport>,
        gateway: Arc<dyn GatewayProvider>,
        reporter: Arc<dyn IssueReporter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                gateway,
                reporter,
                session: Mutex::new(Session::default()),
                events,
            }),
        }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<PortForwardingState> {
        self.inner.events.subscribe()
    }

    /// Last published state
    pub async fn state(&self) -> PortForwardingState {
        self.inner
            .session
            .lock()
            .await
            .last_state
            .clone()
            .unwrap_or_default()
    }

    /// External address reported by the gateway's hello reply
    pub async fn external_ip(&self) -> Option<std::net::Ipv4Addr> {
        self.inner.session.lock().await.hello.map(|h| h.external_ip)
    }

    /// Publish the last state again for late subscribers
    pub async fn repeat_state(&self) {
        let state = self.state().await;
        let _ = self.inner.events.send(state);
    }

    /// Negotiate a mapping; rejected while a previous start is still running
    pub async fn start(&self) {
        let token = {
            let mut session = self.inner.session.lock().await;
            if session.run_token.as_ref().is_some_and(|t| !t.is_cancelled()) {
                warn!("Can't start port mapping because it is already running");
                return;
            }
            if let Some(stop) = session.stop_token.take() {
                stop.cancel();
            }
            let token = CancellationToken::new();
            session.run_token = Some(token.clone());
            token
        };

        self.inner.change_state(PortMappingStatus::Starting).await;

        match self.inner.run(&token).await {
            Ok(mapping) => {
                let renewal = tokio::spawn(Arc::clone(&self.inner).renewal_loop(token, mapping));
                self.inner.session.lock().await.renewal = Some(renewal);
            }
            Err(e) => self.inner.fail(&token, e).await,
        }
    }

    /// Cancel everything in flight and release the mapping
    pub async fn stop(&self) {
        let (run_token, stop_token, renewal, mapped) = {
            let mut session = self.inner.session.lock().await;
            let status = session.last_state.as_ref().map(|s| s.status);
            if matches!(status, None | Some(PortMappingStatus::Stopped)) {
                debug!("Can't stop port mapping because it is already stopped ({:?})", status);
                return;
            }
            if session.stop_token.as_ref().is_some_and(|t| !t.is_cancelled()) {
                warn!("Can't stop port mapping because it is already stopping");
                return;
            }

            let stop_token = CancellationToken::new();
            session.stop_token = Some(stop_token.clone());
            (
                session.run_token.clone(),
                stop_token,
                session.renewal.take(),
                session.mapped_port.as_ref().map(|m| m.mapped_port),
            )
        };

        info!("Stopping NAT-PMP");
        if let Some(token) = run_token {
            token.cancel();
        }
        // No datagram may leave after teardown starts
        if let Some(renewal) = renewal {
            let _ = renewal.await;
        }

        if let Some(port) = mapped {
            self.inner
                .change_state(PortMappingStatus::DestroyPortMappingCommunication)
                .await;
            for protocol in [MappingProtocol::Tcp, MappingProtocol::Udp] {
                info!("Requesting to destroy mapped {} port pair {}", protocol, port);
                if let Err(e) = self.inner.destroy_mapping(protocol, port, &stop_token).await {
                    error!("Error when destroying {} port mapping: {}", protocol, e);
                }
            }
        }

        self.inner.transport.close().await;
        self.inner.session.lock().await.mapped_port = None;
        self.inner.change_state(PortMappingStatus::Stopped).await;
        stop_token.cancel();
    }
}

impl Inner {
    async fn run(&self, token: &CancellationToken) -> Result<Mapping, NatPmpError> {
        let gateway = self
            .gateway
            .default_gateway()
            .ok_or(NatPmpError::MissingGateway)?;
        let endpoint = SocketAddr::new(gateway, self.config.port);
        self.transport.connect(endpoint).await?;
        info!("Starting NAT-PMP communication with gateway {}", endpoint);

        self.hello(token).await?;
        self.map_ports(token, None).await
    }

    async fn hello(&self, token: &CancellationToken) -> Result<(), NatPmpError> {
        self.change_state_if_active(token, PortMappingStatus::HelloCommunication)
            .await?;

        let reply = self
            .send_with_retry(token, &HelloQuery.to_bytes(), HelloReply::parse)
            .await?;
        if !reply.is_success() {
            return Err(NatPmpError::ResultCode {
                code: reply.result_code,
                description: result_code_description(reply.result_code),
            });
        }

        debug!("Gateway external address is {}", reply.external_ip);
        self.session.lock().await.hello = Some(reply);
        Ok(())
    }

    async fn map_ports(
        &self,
        token: &CancellationToken,
        previous: Option<MappedPort>,
    ) -> Result<Mapping, NatPmpError> {
        self.change_state_if_active(token, PortMappingStatus::PortMappingCommunication)
            .await?;

        let tcp = self.request_mapping(token, MappingProtocol::Tcp, previous).await?;
        let udp = self.request_mapping(token, MappingProtocol::Udp, previous).await?;

        let (tcp, udp) = match (tcp, udp) {
            (None, None) => return Err(NatPmpError::MappingFailed),
            (Some(tcp), None) => (tcp, tcp),
            (None, Some(udp)) => (udp, udp),
            (Some(tcp), Some(udp)) => (tcp, udp),
        };

        let mapped_tcp = TemporaryMappedPort::from_reply(&tcp, SystemTime::now());
        let mapped_udp = TemporaryMappedPort::from_reply(&udp, SystemTime::now());
        if mapped_tcp.mapped_port != mapped_udp.mapped_port {
            error!(
                "The TCP and UDP ports do not match, using TCP [TCP: {}, UDP: {}]",
                mapped_tcp.mapped_port, mapped_udp.mapped_port
            );
            self.reporter.capture_message(
                "NAT-PMP TCP and UDP ports don't match.",
                &format!(
                    "[NAT-PMP] TCP: {}, UDP: {}",
                    mapped_tcp.mapped_port, mapped_udp.mapped_port
                ),
            );
        }

        let renew_after =
            Duration::from_secs(u64::from(tcp.lifetime_seconds / 2)).max(MIN_RENEWAL_DELAY);
        let port = mapped_tcp.mapped_port;
        self.session.lock().await.mapped_port = Some(mapped_tcp);

        self.change_state_if_active(token, PortMappingStatus::SleepingUntilRefresh)
            .await?;
        Ok(Mapping { port, renew_after })
    }

    /// Ok(None) when the gateway refused or never answered
    async fn request_mapping(
        &self,
        token: &CancellationToken,
        protocol: MappingProtocol,
        previous: Option<MappedPort>,
    ) -> Result<Option<PortMappingReply>, NatPmpError> {
        let mut query = PortMappingQuery::new(protocol, self.config.lease_seconds);
        if let Some(port) = previous {
            query = query.with_ports(port.internal_port, port.external_port);
        }

        let result = self
            .send_with_retry(token, &query.to_bytes(), |bytes| {
                PortMappingReply::parse(bytes, protocol)
            })
            .await;

        match result {
            Ok(reply) if reply.is_success() => Ok(Some(reply)),
            Ok(reply) => {
                error!(
                    "Port mapping {} response was not successful [ResultCode: {} ({})]",
                    protocol,
                    reply.result_code,
                    result_code_description(reply.result_code)
                );
                Ok(None)
            }
            Err(NatPmpError::Cancelled) => Err(NatPmpError::Cancelled),
            Err(e) => {
                error!("Port mapping {} request failed: {}", protocol, e);
                Ok(None)
            }
        }
    }

    async fn renewal_loop(self: Arc<Self>, token: CancellationToken, mut mapping: Mapping) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Port mapping renewal cancelled");
                    return;
                }
                _ = tokio::time::sleep(mapping.renew_after) => {}
            }

            info!("Port mapping renewal started for pair {}", mapping.port);
            match self.map_ports(&token, Some(mapping.port)).await {
                Ok(renewed) => mapping = renewed,
                Err(e) => {
                    self.fail(&token, e).await;
                    return;
                }
            }
        }
    }

    async fn destroy_mapping(
        &self,
        protocol: MappingProtocol,
        port: MappedPort,
        token: &CancellationToken,
    ) -> Result<(), NatPmpError> {
        let payload = PortMappingQuery::destroy(protocol, port.internal_port).to_bytes();

        let attempt = async {
            self.transport.send(&payload).await?;
            self.await_reply(token, self.config.min_timeout(), |bytes| {
                PortMappingReply::parse(bytes, protocol)
            })
            .await
        };

        let reply = match attempt.await {
            Ok(reply) => reply,
            Err(e) => {
                // Resend once and give up without waiting
                self.transport.send(&payload).await?;
                return Err(e);
            }
        };

        if reply.confirms_destroy(port.internal_port) {
            info!("Successful port mapping destruction ({})", protocol);
        } else {
            error!(
                "Unsuccessful port mapping destruction. ResultCode: {}, Operation: {}, \
                 InternalPort: {}, ExternalPort: {}, LifetimeSeconds: {}",
                reply.result_code,
                protocol,
                reply.internal_port,
                reply.external_port,
                reply.lifetime_seconds
            );
        }
        Ok(())
    }

    /// Send and wait, doubling the timeout after every silent attempt
    async fn send_with_retry<T, F>(
        &self,
        token: &CancellationToken,
        payload: &[u8],
        parse: F,
    ) -> Result<T, NatPmpError>
    where
        F: Fn(&[u8]) -> Result<T, NatPmpError> + Send + Sync,
        T: Send,
    {
        let schedule = self.config.backoff_schedule();
        for &timeout in &schedule {
            if token.is_cancelled() {
                return Err(NatPmpError::Cancelled);
            }

            let result = match self.transport.send(payload).await {
                Ok(()) => self.await_reply(token, timeout, &parse).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(reply) => return Ok(reply),
                Err(NatPmpError::Cancelled) => return Err(NatPmpError::Cancelled),
                Err(e) => {
                    debug!("No usable reply ({:?}): {}", timeout, e);
                    if token.is_cancelled() {
                        return Err(NatPmpError::Cancelled);
                    }
                    if let Err(e) = self.transport.reset().await {
                        warn!("Failed to reset NAT-PMP socket: {}", e);
                    }
                }
            }
        }

        error!("All retries were used for the current communication");
        Err(NatPmpError::RetriesExhausted {
            attempts: schedule.len(),
        })
    }

    /// Wait for a valid reply until `timeout`; invalid datagrams are skipped
    async fn await_reply<T, F>(
        &self,
        token: &CancellationToken,
        timeout: Duration,
        parse: F,
    ) -> Result<T, NatPmpError>
    where
        F: Fn(&[u8]) -> Result<T, NatPmpError>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let bytes = tokio::select! {
                _ = token.cancelled() => return Err(NatPmpError::Cancelled),
                received = tokio::time::timeout_at(deadline, self.transport.recv()) => {
                    match received {
                        Ok(bytes) => bytes?,
                        Err(_) => return Err(NatPmpError::Timeout(timeout)),
                    }
                }
            };

            match parse(&bytes) {
                Ok(reply) => return Ok(reply),
                Err(e) => debug!("Ignoring invalid NAT-PMP reply: {}", e),
            }
        }
    }

    async fn fail(&self, token: &CancellationToken, e: NatPmpError) {
        if e.is_cancelled() {
            info!("NAT-PMP operation cancelled");
            return;
        }

        error!("NAT-PMP failed: {}", e);
        token.cancel();
        self.session.lock().await.mapped_port = None;
        self.change_state(PortMappingStatus::Error).await;
    }

    async fn change_state_if_active(
        &self,
        token: &CancellationToken,
        status: PortMappingStatus,
    ) -> Result<(), NatPmpError> {
        if token.is_cancelled() {
            return Err(NatPmpError::Cancelled);
        }
        self.change_state(status).await;
        Ok(())
    }

    async fn change_state(&self, status: PortMappingStatus) {
        let state = {
            let mut session = self.session.lock().await;
            let state = PortForwardingState::new(status, session.mapped_port.clone());
            session.last_state = Some(state.clone());
            state
        };

        match &state.mapped_port {
            Some(mapped) => info!(
                "State changed to {:?}, port pair {}, expiring after {:?}",
                status, mapped.mapped_port, mapped.lifetime
            ),
            None => info!("State changed to {:?}", status),
        }

        let _ = self.events.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::StaticGateway;
    use crate::testing::{RecordingReporter, ScriptedTransport, gateway_reply, hello_reply, mapping_reply};
    use std::net::{IpAddr, Ipv4Addr};

    const PORT: u16 = 40000;

    fn client_with(transport: Arc<ScriptedTransport>) -> (NatPmpClient, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let client = NatPmpClient::new(
            NatPmpConfig::default(),
            transport,
            Arc::new(StaticGateway(Some(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1))))),
            reporter.clone(),
        );
        (client, reporter)
    }

    fn healthy_gateway() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(|query| vec![gateway_reply(query, PORT, 7200)]))
    }

    fn drain(rx: &mut broadcast::Receiver<PortForwardingState>) -> Vec<PortMappingStatus> {
        let mut statuses = Vec::new();
        while let Ok(state) = rx.try_recv() {
            statuses.push(state.status);
        }
        statuses
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_maps_ports() {
        let transport = healthy_gateway();
        let (client, reporter) = client_with(transport.clone());
        let mut rx = client.subscribe();

        client.start().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                PortMappingStatus::Starting,
                PortMappingStatus::HelloCommunication,
                PortMappingStatus::PortMappingCommunication,
                PortMappingStatus::SleepingUntilRefresh,
            ]
        );
        let state = client.state().await;
        assert_eq!(state.external_port(), Some(PORT));
        assert_eq!(state.mapped_port.unwrap().lifetime, Duration::from_secs(7200));
        assert_eq!(
            transport.gateway(),
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1)), 5351))
        );
        assert_eq!(client.external_ip().await, Some(Ipv4Addr::new(203, 0, 113, 7)));
        assert!(reporter.messages().is_empty());

        let queries = transport.sent_queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].protocol, MappingProtocol::Tcp);
        assert_eq!(queries[1].protocol, MappingProtocol::Udp);
        assert!(queries.iter().all(|q| q.lifetime_seconds == 7200 && q.internal_port == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_gateway_backoff() {
        let transport = Arc::new(ScriptedTransport::silent());
        let (client, _) = client_with(transport.clone());

        let started = Instant::now();
        client.start().await;
        let failed = Instant::now();

        let times = transport.send_times();
        assert_eq!(times.len(), 9);
        assert_eq!(times[0], started);

        let mut waits: Vec<u128> = times.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        waits.push((failed - times[8]).as_millis());
        assert_eq!(
            waits,
            vec![250, 500, 1000, 2000, 4000, 8000, 16000, 32000, 64000]
        );
        assert_eq!(transport.resets(), 9);
        assert_eq!(client.state().await.status, PortMappingStatus::Error);
        assert!(client.state().await.mapped_port.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_at_half_lifetime() {
        let transport = healthy_gateway();
        let (client, _) = client_with(transport.clone());
        client.start().await;
        assert_eq!(transport.sent().len(), 3);

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(transport.sent().len(), 3);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let queries = transport.sent_queries();
        assert_eq!(queries.len(), 4);
        assert!(queries[2..]
            .iter()
            .all(|q| q.internal_port == PORT && q.external_port == PORT));
        assert_eq!(client.state().await.status, PortMappingStatus::SleepingUntilRefresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_destroys_and_cancels_renewal() {
        let transport = healthy_gateway();
        let (client, _) = client_with(transport.clone());
        let mut rx = client.subscribe();
        client.start().await;

        client.stop().await;

        let statuses = drain(&mut rx);
        assert_eq!(
            &statuses[statuses.len() - 2..],
            &[
                PortMappingStatus::DestroyPortMappingCommunication,
                PortMappingStatus::Stopped
            ]
        );
        let destroys: Vec<_> = transport
            .sent_queries()
            .into_iter()
            .filter(|q| q.lifetime_seconds == 0)
            .collect();
        assert_eq!(destroys.len(), 2);
        assert!(destroys.iter().all(|q| q.internal_port == PORT && q.external_port == 0));
        assert_eq!(transport.closes(), 1);

        let sent = transport.sent().len();
        tokio::time::sleep(Duration::from_secs(8000)).await;
        assert_eq!(transport.sent().len(), sent);
        assert!(client.state().await.mapped_port.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_destroy_is_single_try_and_second_stop_is_rejected() {
        // Mappings are granted, destroys are never answered
        let transport = Arc::new(ScriptedTransport::new(|query| {
            match PortMappingQuery::parse(query) {
                Ok(q) if q.lifetime_seconds == 0 => Vec::new(),
                _ => vec![gateway_reply(query, PORT, 7200)],
            }
        }));
        let (client, _) = client_with(transport.clone());
        client.start().await;
        let destroys = |t: &ScriptedTransport| {
            t.sent_queries().iter().filter(|q| q.lifetime_seconds == 0).count()
        };

        let began = Instant::now();
        let stopping = client.clone();
        let first = tokio::spawn(async move { stopping.stop().await });
        while destroys(&transport) == 0 {
            tokio::task::yield_now().await;
        }

        client.stop().await;
        assert_eq!(Instant::now(), began);
        assert_eq!(destroys(&transport), 1);

        first.await.unwrap();
        assert_eq!(destroys(&transport), 4);
        assert_eq!(began.elapsed(), Duration::from_millis(500));
        assert_eq!(transport.closes(), 1);
        assert_eq!(client.state().await.status, PortMappingStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let transport = Arc::new(ScriptedTransport::silent());
        let (client, _) = client_with(transport.clone());

        let running = client.clone();
        let first = tokio::spawn(async move { running.start().await });
        while transport.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        client.start().await;
        assert_eq!(transport.sent().len(), 1);

        client.stop().await;
        first.await.unwrap();
        assert_eq!(client.state().await.status, PortMappingStatus::Stopped);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_mismatch_uses_tcp() {
        let transport = Arc::new(ScriptedTransport::new(|query| {
            match PortMappingQuery::parse(query) {
                Ok(q) if q.protocol == MappingProtocol::Udp => {
                    vec![mapping_reply(MappingProtocol::Udp, 0, PORT + 1, PORT + 1, 7200)]
                }
                _ => vec![gateway_reply(query, PORT, 7200)],
            }
        }));
        let (client, reporter) = client_with(transport);

        client.start().await;

        assert_eq!(client.state().await.external_port(), Some(PORT));
        assert_eq!(reporter.messages().len(), 1);
        assert!(reporter.messages()[0].1.contains("40001"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_protocol_uses_other() {
        let transport = Arc::new(ScriptedTransport::new(|query| {
            match PortMappingQuery::parse(query) {
                Ok(q) if q.protocol == MappingProtocol::Tcp => {
                    vec![mapping_reply(MappingProtocol::Tcp, 2, 0, 0, 0)]
                }
                _ => vec![gateway_reply(query, PORT + 2, 7200)],
            }
        }));
        let (client, reporter) = client_with(transport);

        client.start().await;

        let state = client.state().await;
        assert_eq!(state.status, PortMappingStatus::SleepingUntilRefresh);
        assert_eq!(state.external_port(), Some(PORT + 2));
        assert!(reporter.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_failed_is_error_and_restartable() {
        let transport = Arc::new(ScriptedTransport::new(|query| {
            match PortMappingQuery::parse(query) {
                Ok(q) => vec![mapping_reply(q.protocol, 3, 0, 0, 0)],
                Err(_) => vec![hello_reply()],
            }
        }));
        let (client, _) = client_with(transport.clone());

        client.start().await;
        assert_eq!(client.state().await.status, PortMappingStatus::Error);
        assert!(client.state().await.mapped_port.is_none());

        client.start().await;
        let hellos = transport.sent().iter().filter(|b| b.len() == 2).count();
        assert_eq!(hellos, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_replies_are_skipped() {
        let transport = Arc::new(ScriptedTransport::new(|query| {
            if query.len() == 2 {
                vec![vec![0, 128, 0], vec![1; 12], hello_reply()]
            } else {
                vec![gateway_reply(query, PORT, 7200)]
            }
        }));
        let (client, _) = client_with(transport.clone());

        client.start().await;

        assert_eq!(client.state().await.status, PortMappingStatus::SleepingUntilRefresh);
        assert_eq!(transport.sent().iter().filter(|b| b.len() == 2).count(), 1);
    }

    #[tokio::test]
    async fn test_missing_gateway() {
        let transport = healthy_gateway();
        let client = NatPmpClient::new(
            NatPmpConfig::default(),
            transport.clone(),
            Arc::new(StaticGateway(None)),
            Arc::new(RecordingReporter::default()),
        );

        client.start().await;

        assert_eq!(client.state().await.status, PortMappingStatus::Error);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_state_for_late_subscriber() {
        let transport = healthy_gateway();
        let (client, _) = client_with(transport);
        client.start().await;

        let mut rx = client.subscribe();
        client.repeat_state().await;

        let state = rx.recv().await.unwrap();
        assert_eq!(state.status, PortMappingStatus::SleepingUntilRefresh);
        assert_eq!(state.external_port(), Some(PORT));
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let transport = healthy_gateway();
        let (client, _) = client_with(transport.clone());
        let mut rx = client.subscribe();

        client.stop().await;

        assert_eq!(transport.closes(), 0);
        assert!(drain(&mut rx).is_empty());
    }
}
