//! Wire protocol messages for the stream-json subprocess protocol
//!
//! Every line on the subprocess's stdin and stdout is one complete JSON
//! object. Outbound frames are always user messages; inbound frames are
//! discriminated by their `type` field.

use serde::{Deserialize, Serialize};

/// Content block types inside an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Extended thinking block
    Thinking {
        /// Thinking content
        thinking: String,
    },
    /// Tool invocation request
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Tool input parameters
        input: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this is a result for
        tool_use_id: String,
        /// Result content
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        /// Whether this is an error result
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// User message payload: plain string or structured blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain string content
    String(String),
    /// Structured content blocks
    Blocks(Vec<serde_json::Value>),
}

/// `message` object of a user frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessageBody {
    /// Always "user"
    pub role: String,
    /// Message content
    pub content: UserContent,
}

/// `message` object of an assistant frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantContent {
    /// Model that generated the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Message content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Inbound message kinds, discriminated by `"type"`.
///
/// Unknown types are represented as [`Message::Other`]; the parser produces
/// that variant rather than failing, so an unrecognized frame is never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Echoed user message
    User {
        /// Message content
        message: UserMessageBody,
    },
    /// Structured assistant reply
    Assistant {
        /// Message content
        message: AssistantContent,
    },
    /// System/lifecycle message from the CLI
    System {
        /// System message subtype
        #[serde(default)]
        subtype: String,
        /// Additional system message data
        #[serde(flatten)]
        data: serde_json::Value,
    },
    /// Terminal message of a turn, carrying cost accounting
    Result {
        /// Result subtype
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        /// Final text of the turn
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Cost increment for the completed turn, in USD
        #[serde(skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        /// Whether the turn ended in error
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        /// Number of turns so far
        #[serde(skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
    },
    /// Any other `"type"`; logged as unrecognized, never fatal
    #[serde(skip)]
    Other(serde_json::Value),
}

impl Message {
    /// Concatenated text of an assistant message's text blocks, if any.
    #[must_use]
    pub fn assistant_text(&self) -> Option<String> {
        let Self::Assistant { message } = self else {
            return None;
        };
        let text: Vec<&str> = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join("\n"))
        }
    }

    /// Names of tools invoked by an assistant message.
    #[must_use]
    pub fn tool_uses(&self) -> Vec<&str> {
        let Self::Assistant { message } = self else {
            return Vec::new();
        };
        message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Outbound user frame written to the subprocess's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    /// Always "user"
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Message payload
    pub message: UserMessageBody,
}

impl OutboundMessage {
    /// Build a user frame from plain text.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: "user",
            message: UserMessageBody {
                role: String::from("user"),
                content: UserContent::String(content.into()),
            },
        }
    }
}
