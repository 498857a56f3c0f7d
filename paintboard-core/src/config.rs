//! Client configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PaintError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote endpoints.
    pub endpoint: EndpointConfig,
    /// Socket timing.
    pub timing: TimingConfig,
    /// Retry budgets.
    pub retry: RetryConfig,
    /// Canvas extent.
    pub canvas: CanvasConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Remote endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Paint socket URL.
    pub socket_url: String,
    /// Credential exchange URL.
    pub credential_url: String,
    /// Per-request HTTP timeout in milliseconds.
    pub http_timeout_ms: u64,
}

/// Socket timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Batch flush tick in milliseconds.
    pub flush_interval_ms: u64,
    /// How long a submitted request waits for its result.
    pub request_timeout_ms: u64,
    /// How long a caller waits for the session to open.
    pub open_timeout_ms: u64,
    /// First reconnect delay; doubles per failed attempt.
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling.
    pub reconnect_max_ms: u64,
    /// Outbound transmission queue depth.
    pub outbound_capacity: usize,
}

/// Retry budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per `paint()` call.
    pub paint_attempts: u32,
    /// Base backoff between paint attempts; doubles per attempt.
    pub paint_backoff_ms: u64,
    /// Paint backoff ceiling.
    pub paint_backoff_max_ms: u64,
    /// Attempts per credential exchange.
    pub credential_attempts: u32,
    /// First credential retry delay; doubles per attempt.
    pub credential_backoff_ms: u64,
}

/// Canvas extent; coordinates must be strictly below these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u16,
    pub height: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            socket_url: "wss://paintboard.luogu.me/api/paintboard/ws".into(),
            credential_url: "https://paintboard.luogu.me/api/auth/gettoken".into(),
            http_timeout_ms: 5_000,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 20,
            request_timeout_ms: 10_000,
            open_timeout_ms: 15_000,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            outbound_capacity: 256,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            paint_attempts: 5,
            paint_backoff_ms: 500,
            paint_backoff_max_ms: 30_000,
            credential_attempts: 3,
            credential_backoff_ms: 200,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Duration accessors ───────────────────────────────────────────

impl EndpointConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl TimingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl RetryConfig {
    pub fn paint_backoff(&self) -> Duration {
        Duration::from_millis(self.paint_backoff_ms)
    }

    pub fn paint_backoff_max(&self) -> Duration {
        Duration::from_millis(self.paint_backoff_max_ms)
    }

    pub fn credential_backoff(&self) -> Duration {
        Duration::from_millis(self.credential_backoff_ms)
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("{e} in {}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse configuration text strictly.
    pub fn from_toml_str(text: &str) -> Result<Self, PaintError> {
        Ok(toml::from_str(text)?)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("socket_url"));
        assert!(text.contains("flush_interval_ms"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed = ClientConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.timing.request_timeout(), Duration::from_secs(10));
        assert_eq!(parsed.retry.paint_attempts, 5);
        assert_eq!(parsed.canvas.width, 1000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed = ClientConfig::from_toml_str("[timing]\nflush_interval_ms = 5\n").unwrap();
        assert_eq!(parsed.timing.flush_interval(), Duration::from_millis(5));
        assert_eq!(parsed.timing.reconnect_max(), Duration::from_secs(30));
        assert_eq!(parsed.retry.credential_attempts, 3);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ClientConfig::from_toml_str("[timing\n").unwrap_err();
        assert!(matches!(err, PaintError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/paintboard.toml"));
        assert_eq!(cfg.canvas.height, 600);
    }
}
