//! # paintboard-core
//!
//! Client library for the shared paintboard canvas.
//!
//! This crate contains:
//! - **Protocol**: paint request encoding and inbound frame decoding (`PaintCodec`, `Frames`)
//! - **Credential**: owner-secret to session-credential exchange (`HttpCredentialService`)
//! - **Transport**: the `Connector` seam and its WebSocket implementation
//! - **Connection**: the `ConnectionManager` owning one self-healing session
//! - **Batch**: outbound frame coalescing on a fixed tick
//! - **Pending**: request/result correlation with timeouts and resend retention
//! - **Client**: `PaintClient::paint`, the retrying entry point
//! - **Error**: `PaintError`, a typed `thiserror`-based error hierarchy

pub mod batch;
pub mod client;
pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use batch::BatchBuffer;
pub use client::{PaintClient, PaintReceipt, RetryPolicy};
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use credential::{Credential, CredentialSource, HttpCredentialService};
pub use error::PaintError;
pub use pending::{PendingStats, PendingTable, Resolution, ResultReceiver};
pub use protocol::{Frames, InboundFrame, MAX_OWNER_ID, Outcome, PaintCodec, PaintRequest, Point, Rgb};
pub use state::SessionState;
pub use transport::{Connector, FrameSink, FrameStream, Session, WsConnector};
