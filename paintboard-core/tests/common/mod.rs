//! Shared fixtures: an in-memory transport and a scripted credential
//! source, so client behavior can be driven frame by frame.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as chan;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use paintboard_core::protocol::codec::encode_result;
use paintboard_core::{
    ClientConfig, Connector, Credential, CredentialSource, Outcome, PaintClient, PaintError,
    PaintRequest, Point, Rgb, Session,
};

pub const OWNER: u32 = 7;
pub const SECRET: &str = "owner-secret";
pub const COLOR: Rgb = Rgb::new(0xAA, 0xBB, 0xCC);
pub const AT: Point = Point::new(12, 34);
pub const FIRST_TOKEN: &str = "00000000-0000-0000-0000-000000000001";
pub const SECOND_TOKEN: &str = "00000000-0000-0000-0000-000000000002";

const WAIT: Duration = Duration::from_secs(5);

// ── Server side of one loopback session ──────────────────────────

pub struct ServerEnd {
    /// Transmissions written by the client.
    pub inbound: chan::UnboundedReceiver<Bytes>,
    /// Transmissions delivered to the client.
    pub outbound: chan::UnboundedSender<Result<Bytes, PaintError>>,
}

impl ServerEnd {
    /// Next client transmission.
    pub async fn recv(&mut self) -> Bytes {
        tokio::time::timeout(WAIT, self.inbound.next())
            .await
            .expect("timed out waiting for a client transmission")
            .expect("client closed the session")
    }

    /// Next client transmission, or `None` if nothing arrives within `within`.
    pub async fn try_recv(&mut self, within: Duration) -> Option<Bytes> {
        tokio::time::timeout(within, self.inbound.next())
            .await
            .ok()
            .flatten()
    }

    pub fn send(&self, data: impl Into<Bytes>) {
        self.outbound
            .unbounded_send(Ok(data.into()))
            .expect("client stream dropped");
    }

    /// Answer `request_id` with `outcome`.
    pub fn reply(&self, request_id: u32, outcome: Outcome) {
        self.send(encode_result(request_id, outcome));
    }
}

// ── LoopbackConnector ────────────────────────────────────────────

/// Connector whose sessions are in-memory channel pairs. Each accepted
/// session's server end is handed to the test.
pub struct LoopbackConnector {
    ends: mpsc::UnboundedSender<ServerEnd>,
    fail_next: AtomicU32,
    connects: AtomicU32,
}

impl LoopbackConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (ends, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            ends,
            fail_next: AtomicU32::new(0),
            connects: AtomicU32::new(0),
        });
        (connector, rx)
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Session, PaintError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PaintError::Transport("connection refused".into()));
        }

        let (client_tx, inbound) = chan::unbounded::<Bytes>();
        let (outbound, client_rx) = chan::unbounded::<Result<Bytes, PaintError>>();
        self.ends
            .send(ServerEnd { inbound, outbound })
            .map_err(|_| PaintError::ChannelClosed)?;

        let sink = client_tx.sink_map_err(|_| PaintError::ChannelClosed);
        Ok(Session::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

// ── ScriptedCredentials ──────────────────────────────────────────

/// Hands out queued tokens in order, repeating the last one.
pub struct ScriptedCredentials {
    tokens: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicU32,
}

impl ScriptedCredentials {
    pub fn new(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            last: Mutex::new(FIRST_TOKEN.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for ScriptedCredentials {
    async fn acquire(&self, _owner_id: u32, _secret: &str) -> Result<Credential, PaintError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock();
        if let Some(next) = self.tokens.lock().pop_front() {
            *last = next;
        }
        Ok(Credential::new(last.clone()))
    }
}

// ── Harness ──────────────────────────────────────────────────────

pub struct Harness {
    pub client: Arc<PaintClient>,
    pub connector: Arc<LoopbackConnector>,
    pub credentials: Arc<ScriptedCredentials>,
    ends: mpsc::UnboundedReceiver<ServerEnd>,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_tokens(config, &[FIRST_TOKEN])
    }

    pub fn with_tokens(config: ClientConfig, tokens: &[&str]) -> Self {
        let (connector, ends) = LoopbackConnector::new();
        let credentials = ScriptedCredentials::new(tokens);
        let client = Arc::new(PaintClient::with_parts(
            &config,
            connector.clone(),
            credentials.clone(),
        ));
        Self {
            client,
            connector,
            credentials,
            ends,
        }
    }

    /// Server end of the next session the client opens.
    pub async fn accept(&mut self) -> ServerEnd {
        tokio::time::timeout(WAIT, self.ends.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("connector dropped")
    }

    /// Connect and wait until the session is open.
    pub async fn open(&mut self) -> ServerEnd {
        self.client.connect();
        let end = self.accept().await;
        self.client
            .connection()
            .wait_open(WAIT)
            .await
            .expect("session did not open");
        end
    }

    /// Start a `paint()` call for the default owner and pixel.
    pub fn spawn_paint(&self) -> tokio::task::JoinHandle<Result<paintboard_core::PaintReceipt, PaintError>> {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move { client.paint(OWNER, SECRET, COLOR, AT).await })
    }
}

// ── Frame helpers ────────────────────────────────────────────────

pub fn request_id_of(frame: &[u8]) -> u32 {
    u32::from_le_bytes(frame[27..31].try_into().unwrap())
}

pub fn credential_of(frame: &[u8]) -> [u8; 16] {
    frame[11..27].try_into().unwrap()
}

/// The exact frame the client should emit for `request_id`.
pub fn expected_frame(token: &str, request_id: u32) -> Bytes {
    PaintRequest::new(OWNER, Credential::new(token).to_bytes(), AT, COLOR, request_id)
        .unwrap()
        .encode()
}
