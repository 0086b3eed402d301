//! Command protocol for session background tasks
//!
//! All mutation of a live session goes through its command channel; no
//! other component touches the session's state directly.

use tokio::sync::oneshot;

use crate::error::Result;

/// Commands accepted by a session's background task.
pub(super) enum SessionCommand {
    /// Inject a user message into the subprocess
    SendMessage {
        /// Text to send
        content: String,
        /// Channel for the operation result
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Stop the session, always honored even mid-turn
    Stop {
        /// Attempt a graceful drain before killing
        graceful: bool,
        /// Channel for the stop confirmation
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Heartbeat verdict: the session has been silent too long
    MarkStale {
        /// Human-readable staleness reason
        reason: String,
    },
}
