//! Type definitions for the session daemon
//!
//! - [`messages`] - Wire protocol messages exchanged with the subprocess
//! - [`session`] - Session records, status machine, requests and filters
//! - [`logs`] - Append-only log entry types

pub mod logs;
pub mod messages;
pub mod session;

pub use logs::{LogEntry, LogLevel, LogSource};
pub use messages::{AssistantContent, ContentBlock, Message, OutboundMessage, UserContent};
pub use session::{
    CreateSessionRequest, SessionFilter, SessionRecord, SessionStats, SessionStatus,
};
