//! Connection manager.
//!
//! Owns the single transport session. One supervisor task connects,
//! runs the session until it drops, waits out an exponential backoff
//! and connects again, forever, until shutdown. Each session has a
//! reader task and a writer task feeding one dispatch loop, which is
//! the only place inbound transmissions are decoded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{self, BatchBuffer};
use crate::config::TimingConfig;
use crate::error::PaintError;
use crate::pending::{PendingTable, ResultReceiver};
use crate::protocol::codec::pong;
use crate::protocol::{Frames, InboundFrame, PaintRequest};
use crate::state::SessionState;
use crate::transport::{Connector, Session};

type ReadyCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Events feeding the per-session dispatch loop.
#[derive(Debug)]
enum SessionEvent {
    Opened,
    Message(Bytes),
    Closed(Option<String>),
}

// ── ConnectionManager ────────────────────────────────────────────

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    timing: TimingConfig,
    pending: Arc<PendingTable>,
    batch: Arc<BatchBuffer>,
    state: watch::Sender<SessionState>,
    /// Set while the supervisor task is alive.
    supervising: AtomicBool,
    shutdown: CancellationToken,
    ready_callbacks: Mutex<Vec<ReadyCallback>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, timing: TimingConfig) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Closed);
        Arc::new(Self {
            connector,
            timing,
            pending: Arc::new(PendingTable::new()),
            batch: Arc::new(BatchBuffer::new()),
            state,
            supervising: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            ready_callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn pending(&self) -> &Arc<PendingTable> {
        &self.pending
    }

    /// Register a callback invoked each time a session opens, after
    /// retained frames have been resent.
    pub fn on_ready<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ready_callbacks.lock().push(Arc::new(f));
    }

    /// Start the supervisor unless one is already running.
    ///
    /// Returns `true` if this call started it.
    pub fn connect(self: &Arc<Self>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if self
            .supervising
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tokio::spawn(Arc::clone(self).supervise());
        true
    }

    /// Wait until the session is open, starting a connect if needed.
    pub async fn wait_open(self: &Arc<Self>, timeout: Duration) -> Result<(), PaintError> {
        match self.state() {
            SessionState::Open { .. } => return Ok(()),
            SessionState::Closing => return Err(PaintError::ShuttingDown),
            SessionState::Closed => {
                self.connect();
            }
        }

        let mut rx = self.state.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|s| !s.is_closed())).await {
            Ok(Ok(state)) if state.is_open() => Ok(()),
            Ok(Ok(_)) => Err(PaintError::ShuttingDown),
            Ok(Err(_)) => Err(PaintError::ChannelClosed),
            Err(_) => Err(PaintError::Transport(format!(
                "session not open after {timeout:?}"
            ))),
        }
    }

    /// Register `request` and queue its frame for the next flush.
    pub fn submit(&self, request: &PaintRequest) -> ResultReceiver {
        let batch = &self.batch;
        self.pending.register(
            request.request_id(),
            request.encode(),
            self.timing.request_timeout(),
            |frame| batch.push(frame),
        )
    }

    /// Forget a request so it is never resent.
    pub fn abandon(&self, request_id: u32) -> bool {
        self.pending.abandon(request_id)
    }

    /// Stop reconnecting, close the session and release all callers.
    pub fn shutdown(&self) {
        info!("connection manager shutting down");
        self.state.send_modify(SessionState::begin_shutdown);
        self.shutdown.cancel();
        self.pending.close();
        self.batch.clear();
    }

    // ── Supervisor ───────────────────────────────────────────────

    async fn supervise(self: Arc<Self>) {
        let initial = self.timing.reconnect_initial();
        let max = self.timing.reconnect_max();
        let mut backoff = initial;
        let mut delay: Option<Duration> = None;

        loop {
            if let Some(d) = delay {
                debug!(?d, "waiting before reconnect");
                tokio::select! {
                    _ = tokio::time::sleep(d) => {}
                    _ = self.shutdown.cancelled() => break,
                }
            }

            let connected = tokio::select! {
                r = self.connector.connect() => r,
                _ = self.shutdown.cancelled() => break,
            };

            match connected {
                Ok(session) => {
                    backoff = initial;
                    self.run_session(session).await;
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                }
                Err(e) => warn!("connect failed: {e}"),
            }

            delay = Some(backoff);
            backoff = (backoff * 2).min(max);
        }

        self.supervising.store(false, Ordering::Release);
        debug!("supervisor stopped");
    }

    // ── Session ──────────────────────────────────────────────────

    async fn run_session(&self, session: Session) {
        let Session { mut sink, mut stream } = session;
        let capacity = self.timing.outbound_capacity.max(1);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(capacity);
        let (event_tx, mut events) = mpsc::channel::<SessionEvent>(capacity);

        let _ = event_tx.send(SessionEvent::Opened).await;

        // Writer: outbound channel -> transport
        let writer_events = event_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(transmission) = out_rx.recv().await {
                if let Err(e) = sink.send(transmission).await {
                    let _ = writer_events
                        .send(SessionEvent::Closed(Some(e.to_string())))
                        .await;
                    return;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: transport -> dispatch loop
        let reader = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(data) => SessionEvent::Message(data),
                    Err(e) => {
                        let _ = event_tx.send(SessionEvent::Closed(Some(e.to_string()))).await;
                        return;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx.send(SessionEvent::Closed(None)).await;
        });

        let mut scheduler = None;
        loop {
            let event = tokio::select! {
                e = events.recv() => e,
                _ = self.shutdown.cancelled() => break,
            };
            match event {
                Some(SessionEvent::Opened) => match self.handle_open(&out_tx).await {
                    Ok(()) => {
                        scheduler = Some(batch::spawn_scheduler(
                            Arc::clone(&self.batch),
                            self.timing.flush_interval(),
                            self.state.subscribe(),
                            out_tx.clone(),
                        ));
                        self.notify_ready();
                    }
                    Err(e) => {
                        warn!("session could not open: {e}");
                        break;
                    }
                },
                Some(SessionEvent::Message(data)) => self.handle_message(&data, &out_tx).await,
                Some(SessionEvent::Closed(reason)) => {
                    match reason {
                        Some(reason) => warn!("session closed: {reason}"),
                        None => info!("session closed by peer"),
                    }
                    break;
                }
                None => break,
            }
        }

        self.state.send_modify(|s| {
            let _ = s.close();
        });
        if let Some(scheduler) = scheduler {
            scheduler.abort();
        }
        reader.abort();
        drop(out_tx);
        let writer_abort = writer.abort_handle();
        if tokio::time::timeout(Duration::from_millis(250), writer)
            .await
            .is_err()
        {
            writer_abort.abort();
        }
    }

    /// Resend retained frames in submission order, then mark the
    /// session open.
    async fn handle_open(&self, out: &mpsc::Sender<Bytes>) -> Result<(), PaintError> {
        // Everything buffered is also retained, so the snapshot covers it.
        let batch = &self.batch;
        let resend = self.pending.drain_all_with(|| batch.clear());
        if !resend.is_empty() {
            info!(count = resend.len(), "resending unconfirmed requests");
        }
        for frame in resend {
            out.send(frame).await?;
        }

        let mut result = Ok(());
        self.state.send_modify(|s| result = s.open());
        if result.is_ok() {
            info!("session open");
        }
        result
    }

    async fn handle_message(&self, data: &[u8], out: &mpsc::Sender<Bytes>) {
        for frame in Frames::new(data) {
            match frame {
                Ok(InboundFrame::Ping) => {
                    if out.send(pong()).await.is_err() {
                        warn!("pong dropped: writer closed");
                    }
                }
                Ok(InboundFrame::PaintResult {
                    request_id,
                    outcome,
                }) => {
                    debug!(request_id, %outcome, "paint result");
                    self.pending.resolve(request_id, outcome);
                }
                Err(e) => warn!("discarding rest of transmission: {e}"),
            }
        }
    }

    fn notify_ready(&self) {
        let callbacks: Vec<ReadyCallback> = self.ready_callbacks.lock().clone();
        for callback in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .field("buffered", &self.batch.len())
            .finish()
    }
}
