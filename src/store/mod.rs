//! Persistence seam
//!
//! The core never assumes a storage engine; it writes through this narrow
//! interface. Log appends are strictly ordered per session and never
//! mutated afterwards.

mod memory;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::types::logs::LogEntry;
use crate::types::session::{SessionFilter, SessionRecord};

pub use memory::MemoryStore;

/// Read/write interface onto session and log persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or fully replace a session row.
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()>;

    /// Read one session row.
    async fn read_session(&self, id: Uuid) -> Result<Option<SessionRecord>>;

    /// List session rows passing `filter`, newest first.
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>>;

    /// Remove a session row and its logs.
    async fn delete_session(&self, id: Uuid) -> Result<()>;

    /// Append one log entry; per-session timestamp order is preserved.
    async fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Read up to `limit` most recent log entries for a session, oldest
    /// first within the returned window.
    async fn read_logs(&self, session_id: Uuid, limit: usize) -> Result<Vec<LogEntry>>;

    /// Delete log entries older than `age`, across all sessions.
    /// Returns the number of entries removed.
    async fn delete_logs_older_than(&self, age: Duration) -> Result<usize>;
}
