//! Session records, status machine and request types

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle status.
///
/// Transitions outside [`SessionStatus::can_transition`] are rejected and
/// logged rather than applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Stopped,
    Starting,
    Running,
    Waiting,
    Error,
}

impl SessionStatus {
    /// Whether the session counts against the concurrent-session cap.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Waiting)
    }

    /// Whether the status machine permits moving from `self` to `to`.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::Running | Self::Error | Self::Stopped)
                | (Self::Running, Self::Waiting | Self::Error | Self::Stopped)
                | (Self::Waiting, Self::Running | Self::Error | Self::Stopped)
                | (Self::Error, Self::Stopped)
        )
    }

    /// Lowercase name, matching the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one supervised session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identity
    pub id: Uuid,
    /// Human name; unique among non-stopped sessions
    pub name: String,
    /// Owning user
    pub user_id: Uuid,
    /// Conversation used for feed correlation, if bridged
    pub conversation_id: Option<Uuid>,
    /// Current status
    pub status: SessionStatus,
    /// Free-form description of what the session is doing
    pub current_task: Option<String>,
    /// Last failure reason, for postmortem
    pub last_error: Option<String>,
    /// Subprocess id while attached
    pub pid: Option<u32>,
    /// Per-session log file destination
    pub log_path: Option<PathBuf>,
    /// Subprocess working directory
    pub working_directory: PathBuf,
    /// Custom initial instructions passed to the subprocess
    pub system_prompt: Option<String>,
    /// Cost ceiling; a turn pushing the total past this forces `error`
    pub max_cost_usd: f64,
    /// Accumulated cost; non-decreasing while running
    pub total_cost_usd: f64,
    /// Completed turns
    pub message_count: u64,
    /// Tool invocations observed
    pub tool_calls: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Fresh record in `stopped` status for a create request.
    #[must_use]
    pub fn new(request: &CreateSessionRequest, id: Uuid, max_cost_usd: f64) -> Self {
        Self {
            id,
            name: request.name.clone(),
            user_id: request.user_id,
            conversation_id: request.conversation_id,
            status: SessionStatus::Stopped,
            current_task: request.task.clone(),
            last_error: None,
            pid: None,
            log_path: None,
            working_directory: request.working_directory.clone(),
            system_prompt: request.system_prompt.clone(),
            max_cost_usd,
            total_cost_usd: 0.0,
            message_count: 0,
            tool_calls: 0,
            created_at: Utc::now(),
            started_at: None,
            last_activity_at: None,
            stopped_at: None,
        }
    }
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Human name, unique among non-stopped sessions
    pub name: String,
    /// Owning user
    pub user_id: Uuid,
    /// Conversation to bridge, if any
    pub conversation_id: Option<Uuid>,
    /// Task description
    pub task: Option<String>,
    /// Subprocess working directory
    pub working_directory: PathBuf,
    /// Custom initial instructions
    pub system_prompt: Option<String>,
    /// Cost ceiling override; daemon default applies when `None`
    pub max_cost_usd: Option<f64>,
}

/// Filter for session listing.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions with this status
    pub status: Option<SessionStatus>,
    /// Only sessions whose name starts with this prefix
    pub name_prefix: Option<String>,
    /// Cap on returned rows
    pub limit: Option<usize>,
}

impl SessionFilter {
    /// Whether `record` passes this filter.
    #[must_use]
    pub fn matches(&self, record: &SessionRecord) -> bool {
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(ref prefix) = self.name_prefix
            && !record.name.starts_with(prefix.as_str())
        {
            return false;
        }
        true
    }
}

/// Aggregate daemon statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub running_sessions: usize,
    pub waiting_sessions: usize,
    pub stopped_sessions: usize,
    pub error_sessions: usize,
    pub max_allowed: usize,
    pub uptime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use SessionStatus::*;
        assert!(Stopped.can_transition(Starting));
        assert!(Starting.can_transition(Running));
        assert!(Starting.can_transition(Error));
        assert!(Running.can_transition(Waiting));
        assert!(Waiting.can_transition(Running));
        assert!(Running.can_transition(Error));
        assert!(Waiting.can_transition(Error));
        assert!(Running.can_transition(Stopped));
        assert!(Error.can_transition(Stopped));

        // Not in the table
        assert!(!Stopped.can_transition(Running));
        assert!(!Error.can_transition(Running));
        assert!(!Stopped.can_transition(Stopped));
        assert!(!Waiting.can_transition(Starting));
    }

    #[test]
    fn active_statuses_count_against_cap() {
        use SessionStatus::*;
        assert!(Starting.is_active());
        assert!(Running.is_active());
        assert!(Waiting.is_active());
        assert!(!Stopped.is_active());
        assert!(!Error.is_active());
    }

    #[test]
    fn filter_by_status_and_prefix() {
        let request = CreateSessionRequest {
            name: String::from("test-chat"),
            user_id: Uuid::new_v4(),
            conversation_id: None,
            task: None,
            working_directory: PathBuf::from("/tmp"),
            system_prompt: None,
            max_cost_usd: None,
        };
        let record = SessionRecord::new(&request, Uuid::new_v4(), 10.0);

        let filter = SessionFilter {
            status: Some(SessionStatus::Stopped),
            name_prefix: Some(String::from("test-")),
            limit: None,
        };
        assert!(filter.matches(&record));

        let filter = SessionFilter {
            status: Some(SessionStatus::Running),
            ..SessionFilter::default()
        };
        assert!(!filter.matches(&record));
    }
}
