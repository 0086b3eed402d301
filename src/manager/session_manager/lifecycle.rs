//! Stopping, deleting and injecting into sessions

use chrono::Utc;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::types::logs::{LogEntry, LogLevel, LogSource};
use crate::types::session::SessionStatus;

use super::super::commands::SessionCommand;
use super::core::SessionManager;

impl SessionManager {
    /// Stop a session, honored from any live state. Graceful stop drains
    /// in-flight work within the configured grace period first. Idempotent
    /// for already-stopped sessions.
    ///
    /// # Errors
    /// `SessionNotFound` when no such session exists.
    pub async fn stop_session(&self, id: Uuid, graceful: bool) -> Result<()> {
        let handle = self.registry.lock().await.get(&id).cloned();

        if let Some(handle) = handle {
            if handle.status().await == SessionStatus::Stopped {
                return Ok(());
            }
            let (response_tx, response_rx) = oneshot::channel();
            let sent = handle
                .command_tx
                .send(SessionCommand::Stop {
                    graceful,
                    response_tx,
                })
                .is_ok();
            if sent {
                // Task replies after the transport is down and the record
                // persisted; a dropped reply means it already exited.
                let _ = response_rx.await;
                return Ok(());
            }
        }

        // No live task: a row reconciled at startup or whose spawn failed.
        self.force_stop_record(id).await
    }

    /// Delete a stopped session and its logs.
    ///
    /// # Errors
    /// `InvalidStateError` unless the session is `stopped`;
    /// `SessionNotFound` when no such session exists.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut registry = self.registry.lock().await;
        if let Some(handle) = registry.get(&id) {
            let status = handle.status().await;
            if status != SessionStatus::Stopped {
                return Err(SessionError::invalid_state(
                    status.as_str(),
                    "only stopped sessions can be deleted",
                ));
            }
            registry.remove(&id);
        }
        drop(registry);

        let record = self
            .store
            .read_session(id)
            .await?
            .ok_or(SessionError::SessionNotFound(id))?;
        if record.status != SessionStatus::Stopped {
            return Err(SessionError::invalid_state(
                record.status.as_str(),
                "only stopped sessions can be deleted",
            ));
        }

        self.store.delete_session(id).await?;
        log::info!("Session {} deleted", record.name);
        Ok(())
    }

    /// Inject a user message into a live session.
    ///
    /// # Errors
    /// `SessionNotFound` for unknown ids, `InvalidStateError` when the
    /// session is not active, transport errors when the write fails.
    pub async fn send_to_session(&self, id: Uuid, content: impl Into<String>) -> Result<()> {
        let handle = self
            .registry
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(id))?;

        let (response_tx, response_rx) = oneshot::channel();
        handle
            .command_tx
            .send(SessionCommand::SendMessage {
                content: content.into(),
                response_tx,
            })
            .map_err(|_| {
                SessionError::invalid_state("stopped", "session task is no longer running")
            })?;

        response_rx.await.map_err(|_| {
            SessionError::invalid_state("stopped", "session task exited before replying")
        })?
    }

    /// Mark a row without a live task as stopped.
    async fn force_stop_record(&self, id: Uuid) -> Result<()> {
        let mut record = self
            .store
            .read_session(id)
            .await?
            .ok_or(SessionError::SessionNotFound(id))?;

        if record.status == SessionStatus::Stopped {
            return Ok(());
        }
        let from = record.status;
        record.status = SessionStatus::Stopped;
        record.stopped_at = Some(Utc::now());
        record.pid = None;
        self.store
            .append_log(&LogEntry::new(
                id,
                LogLevel::Info,
                LogSource::System,
                format!("status {from} -> stopped: explicit stop (no live process)"),
            ))
            .await?;
        self.store.upsert_session(&record).await?;
        Ok(())
    }
}
