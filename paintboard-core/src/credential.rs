//! Session credential exchange.
//!
//! An owner id plus long-lived secret is traded for a short-lived
//! credential over HTTP. The credential travels on the wire as 16 raw
//! bytes; malformed credential strings degrade to zero bytes instead of
//! failing, so the server rejects them as stale.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::PaintError;

// ── Credential ───────────────────────────────────────────────────

/// Opaque short-lived credential proving the right to paint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as the 16-byte wire field.
    ///
    /// Hyphens are stripped and each remaining pair of characters is
    /// parsed as hex. Unparseable pairs become zero; missing pairs stay
    /// zero.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        let digits: Vec<u8> = self.0.bytes().filter(|&b| b != b'-').collect();
        for (slot, pair) in out.iter_mut().zip(digits.chunks_exact(2)) {
            *slot = std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .unwrap_or(0);
        }
        out
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

// ── CredentialSource ─────────────────────────────────────────────

/// Anything that can trade an owner identity for a session credential.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn acquire(&self, owner_id: u32, secret: &str) -> Result<Credential, PaintError>;
}

// ── HttpCredentialService ────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    uid: u32,
    access_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<String>,
}

/// Credential exchange over HTTP with bounded exponential retry.
pub struct HttpCredentialService {
    client: reqwest::Client,
    url: String,
    attempts: u32,
    backoff: Duration,
}

impl HttpCredentialService {
    pub fn new(config: &ClientConfig) -> Result<Self, PaintError> {
        let client = reqwest::Client::builder()
            .timeout(config.endpoint.http_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.endpoint.credential_url.clone(),
            attempts: config.retry.credential_attempts.max(1),
            backoff: config.retry.credential_backoff(),
        })
    }

    /// Point the service at a different exchange endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the HTTP client, e.g. to change proxy or TLS settings.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// One request/response round trip, no retry.
    async fn exchange(&self, owner_id: u32, secret: &str) -> Result<Credential, PaintError> {
        let response = self
            .client
            .post(&self.url)
            .json(&TokenRequest {
                uid: owner_id,
                access_key: secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaintError::Credential(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !content_type.contains("application/json") {
            return Err(PaintError::Credential(format!(
                "unexpected content type {content_type:?}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        body.data
            .and_then(|d| d.token)
            .map(Credential::new)
            .ok_or_else(|| PaintError::Credential("response has no data.token".into()))
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialService {
    async fn acquire(&self, owner_id: u32, secret: &str) -> Result<Credential, PaintError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.exchange(owner_id, secret).await {
                Ok(credential) => {
                    debug!(owner_id, attempt, "credential acquired");
                    return Ok(credential);
                }
                Err(e) if attempt >= self.attempts => {
                    error!(owner_id, attempt, "credential exchange failed: {e}");
                    return Err(match e {
                        PaintError::Credential(_) => e,
                        other => PaintError::Credential(other.to_string()),
                    });
                }
                Err(e) => {
                    warn!(owner_id, attempt, ?delay, "credential exchange failed: {e}; retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
