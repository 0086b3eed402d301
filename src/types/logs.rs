//! Append-only session log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Source channel of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Line written to the subprocess
    Stdin,
    /// Line received from the subprocess
    Stdout,
    /// Subprocess stderr output
    Stderr,
    /// Lifecycle transitions and daemon events
    System,
    /// Messages observed on the external chat feed
    Chat,
}

/// One observable event in a session's history. Never mutated after
/// insertion; deleted only by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Owning session
    pub session_id: Uuid,
    /// Entry time; monotonically increasing per session
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Source channel
    pub source: LogSource,
    /// Entry content
    pub content: String,
    /// Tool name, for tool invocation entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Incremental cost attributed to this event, in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// Content is capped so a single runaway frame cannot bloat the store.
const MAX_CONTENT_LEN: usize = 10_000;

impl LogEntry {
    /// Create an entry timestamped now, truncating oversized content.
    #[must_use]
    pub fn new(
        session_id: Uuid,
        level: LogLevel,
        source: LogSource,
        content: impl Into<String>,
    ) -> Self {
        let mut content = content.into();
        if content.len() > MAX_CONTENT_LEN {
            let mut cut = MAX_CONTENT_LEN;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }
        Self {
            session_id,
            timestamp: Utc::now(),
            level,
            source,
            content,
            tool_name: None,
            cost_usd: None,
        }
    }

    /// Attach a tool name.
    #[must_use]
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Attach an incremental cost.
    #[must_use]
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }
}
