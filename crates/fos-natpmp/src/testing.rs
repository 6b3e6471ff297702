//! Scripted gateway doubles

use crate::error::NatPmpError;
use crate::gateway::IssueReporter;
use crate::message::{HelloReply, MappingProtocol, PortMappingQuery, PortMappingReply};
use crate::transport::PmpTransport;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

type Responder = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Transport answering each datagram through a responder closure
pub struct ScriptedTransport {
    responder: Responder,
    replies_tx: mpsc::UnboundedSender<Vec<u8>>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    sent: Mutex<Vec<(Instant, Vec<u8>)>>,
    gateway: Mutex<Option<SocketAddr>>,
    resets: Mutex<usize>,
    closes: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn new(responder: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            responder: Box::new(responder),
            replies_tx,
            replies_rx: tokio::sync::Mutex::new(replies_rx),
            sent: Mutex::new(Vec::new()),
            gateway: Mutex::new(None),
            resets: Mutex::new(0),
            closes: Mutex::new(0),
        }
    }

    /// Gateway that never answers
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn sent_queries(&self) -> Vec<PortMappingQuery> {
        self.sent()
            .iter()
            .filter_map(|b| PortMappingQuery::parse(b).ok())
            .collect()
    }

    pub fn gateway(&self) -> Option<SocketAddr> {
        *self.gateway.lock().unwrap()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

#[async_trait]
impl PmpTransport for ScriptedTransport {
    async fn connect(&self, gateway: SocketAddr) -> Result<(), NatPmpError> {
        *self.gateway.lock().unwrap() = Some(gateway);
        Ok(())
    }

    async fn send(&self, payload: &[u8]) -> Result<(), NatPmpError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), payload.to_vec()));
        for reply in (self.responder)(payload) {
            let _ = self.replies_tx.send(reply);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, NatPmpError> {
        let mut rx = self.replies_rx.lock().await;
        match rx.recv().await {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }

    async fn reset(&self) -> Result<(), NatPmpError> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    async fn close(&self) {
        *self.closes.lock().unwrap() += 1;
    }
}

/// Answer like a well-behaved gateway, assigning `port` to new mappings
pub fn gateway_reply(query: &[u8], port: u16, lifetime: u32) -> Vec<u8> {
    if query.len() == 2 {
        return hello_reply();
    }

    let Ok(query) = PortMappingQuery::parse(query) else {
        return Vec::new();
    };
    if query.lifetime_seconds == 0 {
        return mapping_reply(query.protocol, 0, query.internal_port, 0, 0);
    }

    let internal = if query.internal_port == 0 { port } else { query.internal_port };
    let external = if query.external_port == 0 { port } else { query.external_port };
    mapping_reply(query.protocol, 0, internal, external, lifetime)
}

pub fn hello_reply() -> Vec<u8> {
    HelloReply {
        result_code: 0,
        epoch_seconds: 10,
        external_ip: Ipv4Addr::new(203, 0, 113, 7),
    }
    .to_bytes()
    .to_vec()
}

pub fn mapping_reply(
    protocol: MappingProtocol,
    result_code: u16,
    internal_port: u16,
    external_port: u16,
    lifetime_seconds: u32,
) -> Vec<u8> {
    PortMappingReply {
        protocol,
        result_code,
        epoch_seconds: 10,
        internal_port,
        external_port,
        lifetime_seconds,
    }
    .to_bytes()
    .to_vec()
}

/// Reporter that keeps every captured message
#[derive(Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl IssueReporter for RecordingReporter {
    fn capture_message(&self, message: &str, context: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), context.to_string()));
    }
}
