//! Session state machine.
//!
//! Models the lifecycle of the single transport session, with
//! validated transitions that return `Result` instead of panicking.
//!
//! ```text
//!  Closed ──► Open ──► Closed ──► (backoff) ──► Open ...
//!    │          │
//!    └──────────┴──► Closing   (shutdown; terminal)
//! ```

use std::time::{Duration, Instant};

use crate::error::PaintError;

/// The current state of the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No usable session. Initial state, and the state between
    /// reconnect attempts.
    #[default]
    Closed,

    /// The transport is connected and pending frames were resent.
    Open {
        /// When the session entered `Open`.
        since: Instant,
    },

    /// Shutdown requested; no further connects.
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open { .. } => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Closing)
    }

    /// How long the session has been open; `None` in any other state.
    pub fn open_duration(&self) -> Option<Duration> {
        match self {
            Self::Open { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Open`.
    ///
    /// Valid from: `Closed`.
    pub fn open(&mut self) -> Result<(), PaintError> {
        match self {
            Self::Closed => {
                *self = Self::Open {
                    since: Instant::now(),
                };
                Ok(())
            }
            Self::Open { .. } => Err(PaintError::Transport("session already open".into())),
            Self::Closing => Err(PaintError::ShuttingDown),
        }
    }

    /// Transition to `Closed` after a transport close or error.
    ///
    /// Valid from: `Open`, `Closed`. `Closing` is terminal and is kept.
    pub fn close(&mut self) -> Result<(), PaintError> {
        match self {
            Self::Open { .. } | Self::Closed => {
                *self = Self::Closed;
                Ok(())
            }
            Self::Closing => Err(PaintError::ShuttingDown),
        }
    }

    /// Transition to `Closing` from any state.
    pub fn begin_shutdown(&mut self) {
        *self = Self::Closing;
    }
}

// ── Tests ────────────────────────────────────────────────────────
