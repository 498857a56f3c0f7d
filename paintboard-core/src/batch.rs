//! Outbound batching.
//!
//! Submitters append encoded frames; a fixed tick drains everything
//! appended so far into one transmission. Frames are never split or
//! reordered.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::state::SessionState;

/// Append-only byte accumulator shared by submitters and the flush tick.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    inner: Mutex<BytesMut>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one encoded frame.
    pub fn push(&self, frame: &[u8]) {
        self.inner.lock().extend_from_slice(frame);
    }

    /// Swap the contents for an empty buffer.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn take(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        if inner.is_empty() {
            return None;
        }
        Some(inner.split().freeze())
    }

    /// Discard everything buffered.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ── Scheduler ────────────────────────────────────────────────────

/// Spawn the flush tick for one session.
///
/// Every `interval`, if the session is open and the buffer holds data,
/// the whole buffer goes out as a single transmission. The task ends
/// when `outbound` closes.
pub fn spawn_scheduler(
    buffer: Arc<BatchBuffer>,
    interval: Duration,
    state: watch::Receiver<SessionState>,
    outbound: mpsc::Sender<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if !state.borrow().is_open() {
                continue;
            }
            let Some(batch) = buffer.take() else {
                continue;
            };
            debug!(bytes = batch.len(), "flushing batch");
            if outbound.send(batch).await.is_err() {
                // Session writer is gone; the frames are still retained
                // by the pending table and go out again on reconnect.
                break;
            }
        }
    })
}
