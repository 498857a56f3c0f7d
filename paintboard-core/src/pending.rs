//! Correlation of in-flight requests with their results.
//!
//! Every submitted frame is retained here until its result arrives or
//! the caller abandons it. The waiting caller and the per-request
//! timer race to write the caller-visible outcome; whichever takes the
//! waiter first wins. A timeout releases the caller but keeps the
//! frame, so a reconnect can still resubmit it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::PaintError;
use crate::protocol::Outcome;

/// Receiving half handed to the submitting caller.
pub type ResultReceiver = oneshot::Receiver<Result<Outcome, PaintError>>;
type Waiter = oneshot::Sender<Result<Outcome, PaintError>>;

// ── PendingEntry ─────────────────────────────────────────────────

/// Bookkeeping for one unconfirmed request.
#[derive(Debug)]
struct PendingEntry {
    /// Submission order, used to replay frames in order.
    seq: u64,
    frame: Bytes,
    /// Number of times the frame has been resent.
    attempts: u32,
    sent_at: Instant,
    waiter: Option<Waiter>,
    timer: Option<AbortHandle>,
}

impl PendingEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// What `resolve` did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The waiting caller received the outcome.
    Delivered,
    /// The frame was retained but its caller had already timed out.
    Orphaned,
    /// No entry for that id.
    Unknown,
}

/// Snapshot of table occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStats {
    /// Entries whose caller is still waiting.
    pub awaiting: usize,
    /// Entries whose caller timed out but whose frame is kept for resend.
    pub retained: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<u32, PendingEntry>,
    next_seq: u64,
}

// ── PendingTable ─────────────────────────────────────────────────

/// Maps request ids to retained frames and waiting callers.
#[derive(Debug, Default)]
pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and start its timeout.
    ///
    /// `enqueue` runs while the table is locked, so a concurrent
    /// [`drain_all_with`](Self::drain_all_with) sees either both the
    /// entry and its enqueued frame or neither.
    pub fn register(
        self: &Arc<Self>,
        request_id: u32,
        frame: Bytes,
        timeout: Duration,
        enqueue: impl FnOnce(&Bytes),
    ) -> ResultReceiver {
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        enqueue(&frame);
        let previous = inner.entries.insert(
            request_id,
            PendingEntry {
                seq,
                frame,
                attempts: 0,
                sent_at: Instant::now(),
                waiter: Some(tx),
                timer: None,
            },
        );
        if let Some(mut stale) = previous {
            warn!(request_id, "request id reused while still pending; dropping old entry");
            stale.cancel_timer();
        }

        let table = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(request_id, timeout);
        });
        if let Some(entry) = inner.entries.get_mut(&request_id) {
            entry.timer = Some(timer.abort_handle());
        }
        rx
    }

    /// Deliver a result. Unknown ids are ignored.
    pub fn resolve(&self, request_id: u32, outcome: Outcome) -> Resolution {
        let Some(mut entry) = self.inner.lock().entries.remove(&request_id) else {
            debug!(request_id, %outcome, "result for unknown request ignored");
            return Resolution::Unknown;
        };
        entry.cancel_timer();
        match entry.waiter.take() {
            Some(waiter) => {
                let _ = waiter.send(Ok(outcome));
                Resolution::Delivered
            }
            None => {
                debug!(request_id, %outcome, "orphaned result; caller already timed out");
                Resolution::Orphaned
            }
        }
    }

    /// Time out the caller of `request_id`, keeping its frame.
    ///
    /// Returns `false` when the caller was already released.
    pub fn expire(&self, request_id: u32, after: Duration) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(&request_id) else {
            return false;
        };
        entry.timer = None;
        match entry.waiter.take() {
            Some(waiter) => {
                warn!(request_id, ?after, "request timed out; frame kept for resend");
                let _ = waiter.send(Err(PaintError::RequestTimeout { request_id, after }));
                true
            }
            None => false,
        }
    }

    /// Drop a request entirely. It will not be resent.
    pub fn abandon(&self, request_id: u32) -> bool {
        match self.inner.lock().entries.remove(&request_id) {
            Some(mut entry) => {
                entry.cancel_timer();
                true
            }
            None => false,
        }
    }

    /// Every retained frame, oldest first, for resubmission.
    ///
    /// Entries stay in the table; their resend counters are bumped.
    pub fn drain_all(&self) -> Vec<Bytes> {
        self.drain_all_with(|| ())
    }

    /// Like [`drain_all`](Self::drain_all), running `under_lock` before
    /// the table is released.
    pub fn drain_all_with(&self, under_lock: impl FnOnce()) -> Vec<Bytes> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let mut frames: Vec<(u64, Bytes)> = inner
            .entries
            .values_mut()
            .map(|entry| {
                entry.attempts += 1;
                entry.sent_at = now;
                (entry.seq, entry.frame.clone())
            })
            .collect();
        under_lock();
        drop(inner);

        frames.sort_unstable_by_key(|(seq, _)| *seq);
        frames.into_iter().map(|(_, frame)| frame).collect()
    }

    /// Release every waiting caller with `ShuttingDown` and forget all frames.
    pub fn close(&self) {
        let entries: Vec<_> = self.inner.lock().entries.drain().collect();
        for (_, mut entry) in entries {
            entry.cancel_timer();
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(Err(PaintError::ShuttingDown));
            }
        }
    }

    /// Resend count and age of the last send for `request_id`.
    pub fn send_info(&self, request_id: u32) -> Option<(u32, Duration)> {
        self.inner
            .lock()
            .entries
            .get(&request_id)
            .map(|e| (e.attempts, e.sent_at.elapsed()))
    }

    pub fn contains(&self, request_id: u32) -> bool {
        self.inner.lock().entries.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> PendingStats {
        let inner = self.inner.lock();
        let awaiting = inner.entries.values().filter(|e| e.waiter.is_some()).count();
        PendingStats {
            awaiting,
            retained: inner.entries.len() - awaiting,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
