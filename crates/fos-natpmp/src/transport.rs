//! Datagram transport to the gateway

use crate::error::NatPmpError;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::debug;

/// Largest reply the protocol defines is 16 bytes
const RECV_BUFFER_LEN: usize = 64;

/// Connected datagram channel to the NAT-PMP gateway
#[async_trait]
pub trait PmpTransport: Send + Sync {
    /// Open a channel to `gateway`, replacing any previous one
    async fn connect(&self, gateway: SocketAddr) -> Result<(), NatPmpError>;

    async fn send(&self, payload: &[u8]) -> Result<(), NatPmpError>;

    /// Wait for the next datagram
    async fn recv(&self) -> Result<Vec<u8>, NatPmpError>;

    /// Reopen the channel to the same gateway
    async fn reset(&self) -> Result<(), NatPmpError>;

    async fn close(&self);
}

#[derive(Default)]
struct UdpState {
    socket: Option<Arc<UdpSocket>>,
    gateway: Option<SocketAddr>,
}

/// tokio UDP socket transport
#[derive(Default)]
pub struct UdpTransport {
    state: Mutex<UdpState>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(gateway: SocketAddr) -> Result<Arc<UdpSocket>, NatPmpError> {
        let local = match gateway {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(gateway).await?;
        debug!("NAT-PMP socket {} connected to {}", socket.local_addr()?, gateway);
        Ok(Arc::new(socket))
    }

    async fn socket(&self) -> Result<Arc<UdpSocket>, NatPmpError> {
        self.state
            .lock()
            .await
            .socket
            .clone()
            .ok_or(NatPmpError::NotConnected)
    }
}

#[async_trait]
impl PmpTransport for UdpTransport {
    async fn connect(&self, gateway: SocketAddr) -> Result<(), NatPmpError> {
        let socket = Self::open(gateway).await?;
        let mut state = self.state.lock().await;
        state.socket = Some(socket);
        state.gateway = Some(gateway);
        Ok(())
    }

    async fn send(&self, payload: &[u8]) -> Result<(), NatPmpError> {
        let socket = self.socket().await?;
        socket.send(payload).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, NatPmpError> {
        // The lock is released before waiting so send/reset are never blocked
        let socket = self.socket().await?;
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let len = socket.recv(&mut buf).await?;
        Ok(buf[..len].to_vec())
    }

    async fn reset(&self) -> Result<(), NatPmpError> {
        let gateway = self
            .state
            .lock()
            .await
            .gateway
            .ok_or(NatPmpError::NotConnected)?;
        let socket = Self::open(gateway).await?;
        self.state.lock().await.socket = Some(socket);
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.socket = None;
        state.gateway = None;
    }
}
