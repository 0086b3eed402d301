//! Session queries and aggregate statistics

use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::types::logs::LogEntry;
use crate::types::session::{SessionFilter, SessionRecord, SessionStats, SessionStatus};

use super::core::SessionManager;

impl SessionManager {
    /// Read one session's persisted state.
    ///
    /// # Errors
    /// `SessionNotFound` when no such session exists.
    pub async fn get_session(&self, id: Uuid) -> Result<SessionRecord> {
        self.store
            .read_session(id)
            .await?
            .ok_or(SessionError::SessionNotFound(id))
    }

    /// List sessions passing `filter`, newest first.
    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        self.store.list_sessions(filter).await
    }

    /// Read the most recent `limit` log entries for a session.
    ///
    /// # Errors
    /// `SessionNotFound` when no such session exists.
    pub async fn get_session_logs(&self, id: Uuid, limit: usize) -> Result<Vec<LogEntry>> {
        if self.store.read_session(id).await?.is_none() {
            return Err(SessionError::SessionNotFound(id));
        }
        self.store.read_logs(id, limit).await
    }

    /// Aggregate statistics over all persisted sessions.
    pub async fn stats(&self) -> Result<SessionStats> {
        let sessions = self.store.list_sessions(&SessionFilter::default()).await?;

        let count = |status: SessionStatus| {
            sessions.iter().filter(|s| s.status == status).count()
        };

        Ok(SessionStats {
            total_sessions: sessions.len(),
            running_sessions: count(SessionStatus::Running) + count(SessionStatus::Starting),
            waiting_sessions: count(SessionStatus::Waiting),
            stopped_sessions: count(SessionStatus::Stopped),
            error_sessions: count(SessionStatus::Error),
            max_allowed: self.config.max_sessions,
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        })
    }
}
