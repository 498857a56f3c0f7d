//! Domain-specific error types for the paintboard client.
//!
//! All fallible operations return `Result<T, PaintError>`.
//! Transport failures are absorbed by the connection manager; only a
//! caller's own terminal state ever reaches the caller.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the paintboard client.
#[derive(Debug, Error)]
pub enum PaintError {
    // ── Credential Errors ────────────────────────────────────────
    /// The credential exchange exhausted its attempts or returned
    /// malformed data.
    #[error("credential exchange failed: {0}")]
    Credential(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// An inbound transmission contained an unrecognized leading byte.
    #[error("protocol desync: unknown opcode {opcode:#04x} at offset {offset}")]
    ProtocolDesync { opcode: u8, offset: usize },

    /// A frame was cut short by the end of its transmission.
    #[error("truncated frame: opcode {opcode:#04x} needs {needed} bytes, {remaining} remaining")]
    TruncatedFrame {
        opcode: u8,
        needed: usize,
        remaining: usize,
    },

    /// The server reported an outcome code outside the known set.
    #[error("request {request_id} returned unknown outcome {code:#04x}")]
    UnknownOutcome { request_id: u32, code: u8 },

    /// The server declined with a retryable outcome (cooldown or stale
    /// credential). Only surfaces as the last error of an exhausted call.
    #[error("request {request_id} declined: {outcome}")]
    Rejected {
        request_id: u32,
        outcome: crate::protocol::Outcome,
    },

    // ── Request Errors ───────────────────────────────────────────
    /// No result arrived for a request within its deadline.
    #[error("request {request_id} timed out after {after:?}")]
    RequestTimeout { request_id: u32, after: Duration },

    /// Every attempt of a `paint()` call failed.
    #[error("paint failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<PaintError>,
    },

    /// The request fails validation before touching the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The client is shutting down and accepts no new work.
    #[error("client is shutting down")]
    ShuttingDown,

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PaintError {
    /// Returns `true` for failures the orchestrator retries with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaintError::RequestTimeout { .. } | PaintError::Transport(_) | PaintError::ChannelClosed
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<std::io::Error> for PaintError {
    fn from(e: std::io::Error) -> Self {
        PaintError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PaintError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PaintError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for PaintError {
    fn from(e: reqwest::Error) -> Self {
        PaintError::Credential(e.to_string())
    }
}

impl From<toml::de::Error> for PaintError {
    fn from(e: toml::de::Error) -> Self {
        PaintError::Config(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for PaintError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        PaintError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for PaintError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        PaintError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PaintError::ProtocolDesync {
            opcode: 0x42,
            offset: 7,
        };
        assert!(e.to_string().contains("0x42"));
        assert!(e.to_string().contains('7'));

        let e = PaintError::UnknownOutcome {
            request_id: 9,
            code: 0xaa,
        };
        assert!(e.to_string().contains("0xaa"));
    }

    #[test]
    fn retries_exhausted_carries_last_error() {
        let e = PaintError::RetriesExhausted {
            attempts: 5,
            last: Box::new(PaintError::Transport("reset".into())),
        };
        let text = e.to_string();
        assert!(text.contains('5'));
        assert!(text.contains("reset"));
    }

    #[test]
    fn retryable_classification() {
        assert!(
            PaintError::RequestTimeout {
                request_id: 1,
                after: Duration::from_secs(10)
            }
            .is_retryable()
        );
        assert!(PaintError::Transport("x".into()).is_retryable());
        assert!(!PaintError::Credential("x".into()).is_retryable());
        assert!(
            !PaintError::UnknownOutcome {
                request_id: 1,
                code: 0
            }
            .is_retryable()
        );
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PaintError = io_err.into();
        assert!(matches!(e, PaintError::Transport(_)));
    }
}
