//! In-memory session store
//!
//! Default store for standalone runs and tests. Keeps full log history in
//! memory; the retention sweep bounds its growth the same way it bounds a
//! real database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::types::logs::LogEntry;
use crate::types::session::{SessionFilter, SessionRecord};

use super::SessionStore;

/// HashMap-backed [`SessionStore`].
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
    logs: Mutex<Vec<LogEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn read_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().await.get(&id).cloned())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.lock().await;
        let mut rows: Vec<SessionRecord> = sessions
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.sessions.lock().await.remove(&id);
        self.logs.lock().await.retain(|entry| entry.session_id != id);
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.logs.lock().await.push(entry.clone());
        Ok(())
    }

    async fn read_logs(&self, session_id: Uuid, limit: usize) -> Result<Vec<LogEntry>> {
        let logs = self.logs.lock().await;
        let matching: Vec<&LogEntry> = logs
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .collect();
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].iter().map(|e| (*e).clone()).collect())
    }

    async fn delete_logs_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - age;
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|entry| entry.timestamp >= cutoff);
        Ok(before - logs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::logs::{LogLevel, LogSource};
    use crate::types::session::{CreateSessionRequest, SessionStatus};
    use std::path::PathBuf;

    fn request(name: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            name: name.to_string(),
            user_id: Uuid::new_v4(),
            conversation_id: None,
            task: None,
            working_directory: PathBuf::from("/tmp"),
            system_prompt: None,
            max_cost_usd: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_read_back() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let mut record = SessionRecord::new(&request("alpha"), id, 5.0);
        store.upsert_session(&record).await.unwrap();

        record.status = SessionStatus::Running;
        record.total_cost_usd = 0.25;
        store.upsert_session(&record).await.unwrap();

        let read = store.read_session(id).await.unwrap().unwrap();
        assert_eq!(read.status, SessionStatus::Running);
        assert!((read.total_cost_usd - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn logs_are_ordered_and_swept() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        for i in 0..5i64 {
            let mut entry =
                LogEntry::new(id, LogLevel::Info, LogSource::System, format!("event {i}"));
            entry.timestamp = Utc::now() - Duration::seconds(100 - i);
            store.append_log(&entry).await.unwrap();
        }

        let logs = store.read_logs(id, 3).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].content, "event 2");
        assert_eq!(logs[2].content, "event 4");

        let removed = store.delete_logs_older_than(Duration::seconds(50)).await.unwrap();
        assert_eq!(removed, 5);
        assert!(store.read_logs(id, 10).await.unwrap().is_empty());
    }
}
