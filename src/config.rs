//! Daemon configuration
//!
//! All knobs come from environment variables (optionally via a `.env` file),
//! mirroring how the daemon is deployed. `DaemonConfig::from_env` never
//! fails; `validate` rejects values the core cannot run with.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Configuration consumed by the session core.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Maximum concurrently active (starting|running|waiting) sessions
    pub max_sessions: usize,
    /// Default cost ceiling applied when a create request carries none
    pub default_max_cost_usd: f64,
    /// Interval between chat feed polls
    pub chat_poll_interval: Duration,
    /// Interval between heartbeat passes
    pub heartbeat_interval: Duration,
    /// Age past which log entries are deleted by the retention sweep
    pub log_retention: Duration,
    /// Interval between retention sweeps
    pub log_cleanup_interval: Duration,
    /// Claude CLI executable (name resolved via PATH, or absolute path)
    pub claude_bin: PathBuf,
    /// Directory for per-session log files
    pub log_dir: PathBuf,
    /// Default working directory for new sessions
    pub working_dir: PathBuf,
    /// Base URL of the chat feed API
    pub chat_api_url: String,
    /// Bearer token for chat feed requests
    pub service_token: String,
    /// Per-request feed timeout, distinct from the poll interval
    pub feed_request_timeout: Duration,
    /// Bounded deadline for a single stdin write
    pub write_timeout: Duration,
    /// Grace period between polite termination and kill
    pub stop_grace_period: Duration,
    /// Deadline for the first frame after spawn
    pub spawn_timeout: Duration,
    /// A session silent for longer than this multiple of the poll interval
    /// is considered stale by the heartbeat
    pub stale_multiplier: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            default_max_cost_usd: 10.0,
            chat_poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            log_retention: Duration::from_secs(86_400),
            log_cleanup_interval: Duration::from_secs(3_600),
            claude_bin: PathBuf::from("claude"),
            log_dir: PathBuf::from("/var/log/claude"),
            working_dir: PathBuf::from("/tmp"),
            chat_api_url: String::from("http://localhost:8001"),
            service_token: String::new(),
            feed_request_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            stop_grace_period: Duration::from_secs(10),
            spawn_timeout: Duration::from_secs(30),
            stale_multiplier: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

impl DaemonConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset. Call `dotenvy::dotenv()` first if a `.env` file
    /// should be honored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions),
            default_max_cost_usd: env_parse("DEFAULT_MAX_COST_USD", defaults.default_max_cost_usd),
            chat_poll_interval: env_secs("CHAT_POLL_INTERVAL", defaults.chat_poll_interval),
            heartbeat_interval: env_secs("HEARTBEAT_INTERVAL", defaults.heartbeat_interval),
            log_retention: env_secs("LOG_RETENTION_SECS", defaults.log_retention),
            log_cleanup_interval: env_secs("LOG_CLEANUP_INTERVAL", defaults.log_cleanup_interval),
            claude_bin: env::var("CLAUDE_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.claude_bin),
            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            working_dir: env::var("WORKING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.working_dir),
            chat_api_url: env::var("CHAT_API_URL").unwrap_or(defaults.chat_api_url),
            service_token: env::var("SERVICE_TOKEN").unwrap_or(defaults.service_token),
            feed_request_timeout: env_secs("FEED_REQUEST_TIMEOUT", defaults.feed_request_timeout),
            write_timeout: env_secs("WRITE_TIMEOUT", defaults.write_timeout),
            stop_grace_period: env_secs("STOP_GRACE_PERIOD", defaults.stop_grace_period),
            spawn_timeout: env_secs("SPAWN_TIMEOUT", defaults.spawn_timeout),
            stale_multiplier: env_parse("STALE_MULTIPLIER", defaults.stale_multiplier),
        }
    }

    /// Reject configurations the core cannot run with.
    ///
    /// # Errors
    /// Returns `SessionError::Validation` naming the offending option.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions < 1 {
            return Err(SessionError::validation("MAX_SESSIONS must be at least 1"));
        }
        if !self.default_max_cost_usd.is_finite() || self.default_max_cost_usd < 0.0 {
            return Err(SessionError::validation(
                "DEFAULT_MAX_COST_USD must be a non-negative number",
            ));
        }
        if self.chat_poll_interval.is_zero() {
            return Err(SessionError::validation("CHAT_POLL_INTERVAL must be > 0"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SessionError::validation("HEARTBEAT_INTERVAL must be > 0"));
        }
        if self.log_retention.is_zero() {
            return Err(SessionError::validation("LOG_RETENTION_SECS must be > 0"));
        }
        if self.stale_multiplier == 0 {
            return Err(SessionError::validation("STALE_MULTIPLIER must be > 0"));
        }
        Ok(())
    }
}
