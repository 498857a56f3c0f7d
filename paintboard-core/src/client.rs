//! Request orchestration: the public `paint()` entry point.
//!
//! Each call acquires a credential, then submits up to
//! `paint_attempts` wire requests until one succeeds:
//!
//! | Attempt result        | Action                                        |
//! |-----------------------|-----------------------------------------------|
//! | success               | return                                        |
//! | stale credential      | re-acquire the credential, retry at once      |
//! | cooldown              | back off `base × 2^attempt`, retry            |
//! | unknown outcome       | fail with `UnknownOutcome`                    |
//! | timeout / transport   | back off `base × 2^attempt`, retry            |

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{CanvasConfig, ClientConfig};
use crate::connection::ConnectionManager;
use crate::credential::{Credential, CredentialSource, HttpCredentialService};
use crate::error::PaintError;
use crate::protocol::{MAX_OWNER_ID, Outcome, PaintRequest, Point, Rgb};
use crate::state::SessionState;
use crate::transport::{Connector, WsConnector};

// ── RetryPolicy ──────────────────────────────────────────────────

/// Attempt budget and backoff curve for `paint()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Backoff after the zero-based `attempt`: `base × 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            attempts: config.retry.paint_attempts.max(1),
            base: config.retry.paint_backoff(),
            max: config.retry.paint_backoff_max(),
        }
    }
}

/// Result of a successful `paint()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintReceipt {
    /// Wire id of the request that succeeded.
    pub request_id: u32,
    pub outcome: Outcome,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

// ── PaintClient ──────────────────────────────────────────────────

/// Shared handle for painting pixels. Cheap to share behind an `Arc`;
/// any number of concurrent `paint()` calls multiplex one session.
pub struct PaintClient {
    connection: Arc<ConnectionManager>,
    credentials: Arc<dyn CredentialSource>,
    policy: RetryPolicy,
    canvas: CanvasConfig,
    open_timeout: Duration,
    next_request_id: AtomicU32,
}

impl PaintClient {
    /// Client over the configured WebSocket and HTTP credential endpoint.
    pub fn new(config: &ClientConfig) -> Result<Self, PaintError> {
        let connector = Arc::new(WsConnector::new(config.endpoint.socket_url.clone()));
        let credentials = Arc::new(HttpCredentialService::new(config)?);
        Ok(Self::with_parts(config, connector, credentials))
    }

    /// Client over caller-supplied transport and credential source.
    pub fn with_parts(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(connector, config.timing.clone()),
            credentials,
            policy: RetryPolicy::from(config),
            canvas: config.canvas.clone(),
            open_timeout: config.timing.open_timeout(),
            next_request_id: AtomicU32::new(1),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn state(&self) -> SessionState {
        self.connection.state()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `f` every time a session opens.
    pub fn on_ready<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connection.on_ready(f);
    }

    /// Start connecting without waiting for a `paint()` call.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Stop the session; in-flight and future calls fail with `ShuttingDown`.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    /// Paint one pixel on behalf of `owner_id`.
    pub async fn paint(
        &self,
        owner_id: u32,
        secret: &str,
        color: Rgb,
        at: Point,
    ) -> Result<PaintReceipt, PaintError> {
        self.validate(owner_id, at)?;

        let mut credential = self.credentials.acquire(owner_id, secret).await?;
        let mut submitted: Vec<u32> = Vec::new();
        let mut last_error = None;

        for attempt in 0..self.policy.attempts {
            let is_last = attempt + 1 == self.policy.attempts;
            let (request_id, result) = self
                .submit_once(owner_id, &credential, color, at, &mut submitted)
                .await;

            let error = match result {
                Ok(Outcome::Success) => {
                    self.abandon_superseded(&submitted);
                    debug!(owner_id, request_id, %at, "painted");
                    return Ok(PaintReceipt {
                        request_id: request_id.unwrap_or_default(),
                        outcome: Outcome::Success,
                        attempts: attempt + 1,
                    });
                }
                Ok(Outcome::StaleCredential) => {
                    info!(owner_id, "credential rejected; re-acquiring");
                    credential = self.credentials.acquire(owner_id, secret).await?;
                    last_error = Some(PaintError::Rejected {
                        request_id: request_id.unwrap_or_default(),
                        outcome: Outcome::StaleCredential,
                    });
                    continue;
                }
                Ok(Outcome::Unknown(code)) => {
                    return Err(PaintError::UnknownOutcome {
                        request_id: request_id.unwrap_or_default(),
                        code,
                    });
                }
                Ok(Outcome::Cooldown) => PaintError::Rejected {
                    request_id: request_id.unwrap_or_default(),
                    outcome: Outcome::Cooldown,
                },
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if !is_last {
                let wait = self.policy.backoff(attempt);
                warn!(owner_id, attempt, ?wait, "paint attempt failed: {error}; backing off");
                tokio::time::sleep(wait).await;
            }
            last_error = Some(error);
        }

        Err(PaintError::RetriesExhausted {
            attempts: self.policy.attempts,
            last: Box::new(last_error.unwrap_or(PaintError::ChannelClosed)),
        })
    }

    /// One submission: wait for the session, send, await the result.
    ///
    /// The request id is `None` when the session never opened.
    async fn submit_once(
        &self,
        owner_id: u32,
        credential: &Credential,
        color: Rgb,
        at: Point,
        submitted: &mut Vec<u32>,
    ) -> (Option<u32>, Result<Outcome, PaintError>) {
        if let Err(e) = self.connection.wait_open(self.open_timeout).await {
            return (None, Err(e));
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = match PaintRequest::new(owner_id, credential.to_bytes(), at, color, request_id)
        {
            Ok(r) => r,
            Err(e) => return (Some(request_id), Err(e)),
        };

        let rx = self.connection.submit(&request);
        submitted.push(request_id);
        let result = rx.await.unwrap_or_else(|e| Err(e.into()));
        (Some(request_id), result)
    }

    /// Drop earlier attempts of a call that has now succeeded.
    fn abandon_superseded(&self, submitted: &[u32]) {
        for &id in submitted {
            if self.connection.abandon(id) {
                debug!(request_id = id, "abandoned superseded request");
            }
        }
    }

    fn validate(&self, owner_id: u32, at: Point) -> Result<(), PaintError> {
        if owner_id > MAX_OWNER_ID {
            return Err(PaintError::InvalidRequest("owner id exceeds 24 bits"));
        }
        if at.x >= self.canvas.width || at.y >= self.canvas.height {
            return Err(PaintError::InvalidRequest("coordinate outside the canvas"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PaintClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaintClient")
            .field("connection", &self.connection)
            .field("policy", &self.policy)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
