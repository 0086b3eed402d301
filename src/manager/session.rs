//! Registry handle for a live session
//!
//! The background task owns the authoritative state; the handle carries
//! shared snapshots the manager reads without touching the task.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};

use super::commands::SessionCommand;
use crate::types::session::SessionStatus;

/// Registry entry for one session.
#[derive(Clone)]
pub(super) struct SessionHandle {
    /// Human name, unique among non-stopped sessions
    pub name: String,
    /// Channel to the background task
    pub command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Status snapshot, written only by the background task
    pub status: Arc<Mutex<SessionStatus>>,
    /// Last transport event observed
    pub last_event_at: Arc<Mutex<Instant>>,
    /// Last successful feed poll, when the session is bridged
    pub last_poll_at: Option<Arc<Mutex<Instant>>>,
}

impl SessionHandle {
    /// Current status snapshot.
    pub async fn status(&self) -> SessionStatus {
        *self.status.lock().await
    }
}
