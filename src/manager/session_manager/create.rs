//! Session creation

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::bridge::Bridge;
use crate::error::{Result, SessionError};
use crate::transport::{SpawnSpec, SubprocessTransport};
use crate::types::logs::{LogEntry, LogLevel, LogSource};
use crate::types::session::{
    CreateSessionRequest, SessionFilter, SessionRecord, SessionStatus,
};

use super::super::background::{SessionTask, spawn_session_task};
use super::super::session::SessionHandle;
use super::core::SessionManager;

/// Longest accepted session name.
const MAX_NAME_LEN: usize = 100;

/// Capacity of the feed-to-subprocess hand-off channel. Bounded so the
/// poll loop cannot run ahead of the subprocess; the cursor only advances
/// after a hand-off succeeds.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

impl SessionManager {
    /// Create and start a new session.
    ///
    /// Capacity and name uniqueness are checked under the registry lock, so
    /// two concurrent creates cannot both pass. On a spawn failure the
    /// session is left in `error` with the reason recorded, and the error
    /// is returned to the caller.
    ///
    /// # Errors
    /// `ValidationError` for a bad request, `CapacityExceededError` when
    /// the active-session cap is reached, `NameConflictError` when the name
    /// is held by a non-stopped session, `SpawnError` when the subprocess
    /// cannot be launched.
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<Uuid> {
        self.validate_request(&request)?;

        let mut registry = self.registry.lock().await;

        // Capacity: sessions in starting|running|waiting count; error and
        // stopped do not.
        let mut active = 0usize;
        for handle in registry.values() {
            if handle.status().await.is_active() {
                active += 1;
            }
        }
        if active >= self.config.max_sessions {
            return Err(SessionError::CapacityExceeded(self.config.max_sessions));
        }

        // Name uniqueness among every non-stopped session, including error
        // sessions that no longer have a live task.
        let existing = self.store.list_sessions(&SessionFilter::default()).await?;
        if existing
            .iter()
            .any(|r| r.name == request.name && r.status != SessionStatus::Stopped)
        {
            return Err(SessionError::NameConflict(request.name));
        }

        let id = Uuid::new_v4();
        let max_cost = request
            .max_cost_usd
            .unwrap_or(self.config.default_max_cost_usd);
        let mut record = SessionRecord::new(&request, id, max_cost);
        record.log_path = Some(self.config.log_dir.join(format!("session-{id}.log")));
        self.store.upsert_session(&record).await?;

        // stopped -> starting, before the subprocess exists
        record.status = SessionStatus::Starting;
        self.store
            .append_log(&LogEntry::new(
                id,
                LogLevel::Info,
                LogSource::System,
                "status stopped -> starting: create request",
            ))
            .await?;
        self.store.upsert_session(&record).await?;

        let spec = SpawnSpec {
            claude_bin: self.config.claude_bin.clone(),
            working_directory: record.working_directory.clone(),
            system_prompt: record.system_prompt.clone(),
            write_timeout: self.config.write_timeout,
            stop_grace_period: self.config.stop_grace_period,
        };
        let (transport, event_rx) = match SubprocessTransport::spawn(&spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                // starting -> error; the record stays for postmortem
                record.status = SessionStatus::Error;
                record.last_error = Some(e.to_string());
                self.store
                    .append_log(&LogEntry::new(
                        id,
                        LogLevel::Error,
                        LogSource::System,
                        format!("status starting -> error: {e}"),
                    ))
                    .await?;
                self.store.upsert_session(&record).await?;
                return Err(e);
            }
        };

        record.pid = transport.pid();
        record.last_activity_at = Some(Utc::now());
        self.store.upsert_session(&record).await?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let bridge = record.conversation_id.map(|conversation_id| {
            Bridge::start(
                Arc::clone(&self.feed),
                conversation_id,
                inbound_tx,
                self.config.chat_poll_interval,
            )
        });

        let status = Arc::new(Mutex::new(SessionStatus::Starting));
        let last_event_at = Arc::new(Mutex::new(Instant::now()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            name: record.name.clone(),
            command_tx,
            status: Arc::clone(&status),
            last_event_at: Arc::clone(&last_event_at),
            last_poll_at: bridge.as_ref().map(Bridge::poll_progress),
        };
        registry.insert(id, handle);
        drop(registry);

        log::info!(
            "Session {} created (id {id}, pid {:?})",
            record.name,
            record.pid
        );

        let task = SessionTask {
            record,
            status,
            last_event_at,
            store: Arc::clone(&self.store),
            transport,
            bridge,
            spawn_timeout: self.config.spawn_timeout,
            pending_sends: 0,
        };
        spawn_session_task(task, command_rx, event_rx, inbound_rx);

        Ok(id)
    }

    fn validate_request(&self, request: &CreateSessionRequest) -> Result<()> {
        if request.name.trim().is_empty() {
            return Err(SessionError::validation("session name must not be empty"));
        }
        if request.name.len() > MAX_NAME_LEN {
            return Err(SessionError::validation(format!(
                "session name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if let Some(ceiling) = request.max_cost_usd
            && (!ceiling.is_finite() || ceiling < 0.0)
        {
            return Err(SessionError::validation(
                "cost ceiling must be a non-negative number",
            ));
        }
        if !request.working_directory.is_dir() {
            return Err(SessionError::validation(format!(
                "working directory does not exist: {}",
                request.working_directory.display()
            )));
        }
        Ok(())
    }
}
