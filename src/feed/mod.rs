//! Chat feed seam
//!
//! The external message-queue-like service a session's conversation lives
//! on. Consumed through a narrow poll/send interface so the bridge never
//! depends on a concrete chat API.

mod http;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

pub use http::HttpFeed;

/// One inbound message retrieved from the feed.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    /// Monotone position within the conversation
    pub cursor: u64,
    /// Display name of the sender, when known
    pub sender: Option<String>,
    /// Message text
    pub text: String,
}

/// Poll/send interface onto the chat service.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Fetch messages in `conversation_id` newer than `since`, oldest first.
    ///
    /// # Errors
    /// Returns [`crate::error::SessionError::FeedUnavailable`] when the
    /// service cannot be reached; the caller retries on its next interval.
    async fn poll(&self, conversation_id: Uuid, since: Option<u64>) -> Result<Vec<FeedMessage>>;

    /// Post `text` into `conversation_id`.
    ///
    /// # Errors
    /// `FeedUnavailable` on transport or non-success status; the relay
    /// retries with bounded backoff.
    async fn send(&self, conversation_id: Uuid, text: &str) -> Result<()>;
}
