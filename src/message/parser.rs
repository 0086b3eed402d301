//! Line parser for the stream-json protocol

use crate::error::{Result, SessionError};
use crate::types::messages::Message;

/// Parse one stdout line into a typed [`Message`].
///
/// A line that is valid JSON but of an unknown `type` is returned as
/// [`Message::Other`]; only lines that are not JSON at all produce
/// [`SessionError::MalformedFrame`]. The caller logs that error and keeps
/// reading - a malformed line never terminates the stream.
///
/// # Errors
/// Returns `SessionError::MalformedFrame` when `line` is not valid JSON.
pub fn parse_line(line: &str) -> Result<Message> {
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).map_err(|_| SessionError::MalformedFrame {
            line: line.trim().to_string(),
        })?;

    match serde_json::from_value::<Message>(value.clone()) {
        Ok(message) => Ok(message),
        Err(_) => Ok(Message::Other(value)),
    }
}
