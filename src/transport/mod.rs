//! Transport layer framing the stream-json protocol over a subprocess
//!
//! Owns exactly one Claude CLI process per instance, translating between
//! structured messages and framed JSON lines on the process's standard
//! streams.

pub mod subprocess;

use crate::types::messages::Message;

/// Event produced by the transport's read loop.
///
/// One event per observable occurrence: a parsed frame, a line that failed
/// to parse, a stderr line, or the terminal exit notification. The event
/// stream ends with exactly one [`TransportEvent::Exited`].
#[derive(Debug)]
pub enum TransportEvent {
    /// One parsed inbound frame
    Message(Message),
    /// A stdout line that is not valid JSON; non-fatal, the stream continues
    Malformed {
        /// Raw offending line
        line: String,
    },
    /// One stderr line
    Stderr(String),
    /// Subprocess exited; terminal event
    Exited {
        /// Exit code, if the process exited normally
        code: Option<i32>,
    },
}

pub use subprocess::{SpawnSpec, SubprocessTransport};
