//! Error types for the session daemon

use thiserror::Error;

/// Main error type for session supervision
#[derive(Error, Debug)]
pub enum SessionError {
    /// Claude binary missing or unlaunchable; the create attempt fails and
    /// the session record is left in `error` for postmortem
    #[error("Failed to spawn Claude process: {0}")]
    Spawn(String),

    /// Write attempted after the subprocess exited
    #[error("Subprocess pipe closed: {0}")]
    BrokenPipe(String),

    /// Bounded write deadline elapsed
    #[error("Write to subprocess timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    /// A stdout line that is not valid JSON; logged and skipped, never fatal
    #[error("Malformed frame from subprocess: {line}")]
    MalformedFrame {
        /// The offending raw line
        line: String,
    },

    /// Active session count has reached the configured maximum
    #[error("Maximum concurrent sessions reached: {0}")]
    CapacityExceeded(usize),

    /// Session name already held by a non-stopped session
    #[error("Session name already in use: {0}")]
    NameConflict(String),

    /// Request rejected before any state change
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Operation not valid for the session's current status
    #[error("Operation not valid in state {state}: {message}")]
    InvalidState {
        /// Current session status
        state: String,
        /// What was attempted
        message: String,
    },

    /// Chat feed unreachable; retried with backoff, never propagated to the
    /// transport
    #[error("Chat feed unavailable: {0}")]
    FeedUnavailable(String),

    /// No session registered under the given id
    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// Persistence-layer failure
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a broken-pipe error
    pub fn broken_pipe(msg: impl Into<String>) -> Self {
        Self::BrokenPipe(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(state: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
            message: msg.into(),
        }
    }

    /// Create a feed-unavailable error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::FeedUnavailable(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error should drive the owning session to `error` state
    /// rather than being returned to a caller.
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::BrokenPipe(_) | Self::WriteTimeout(_) | Self::Spawn(_)
        )
    }
}
