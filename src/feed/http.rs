//! HTTP chat feed client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, SessionError};

use super::{Feed, FeedMessage};

/// Reqwest-backed [`Feed`] against the chat API.
///
/// Every request carries the daemon's bearer token and is bounded by a
/// per-request timeout that is independent of the poll interval.
pub struct HttpFeed {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    cursor: u64,
    #[serde(default)]
    sender: Option<String>,
    #[serde(alias = "content")]
    text: String,
}

impl HttpFeed {
    /// Build a client for `base_url` with the given bearer `token`.
    ///
    /// # Errors
    /// Returns `FeedUnavailable` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SessionError::feed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn messages_url(&self, conversation_id: Uuid) -> String {
        format!(
            "{}/api/chat/conversations/{}/messages",
            self.base_url, conversation_id
        )
    }
}

#[async_trait]
impl Feed for HttpFeed {
    async fn poll(&self, conversation_id: Uuid, since: Option<u64>) -> Result<Vec<FeedMessage>> {
        let mut request = self
            .client
            .get(self.messages_url(conversation_id))
            .bearer_auth(&self.token);
        if let Some(cursor) = since {
            request = request.query(&[("since", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::feed(format!("poll failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SessionError::feed(format!(
                "poll returned status {}",
                response.status()
            )));
        }

        let page: MessagePage = response
            .json()
            .await
            .map_err(|e| SessionError::feed(format!("invalid poll response: {e}")))?;

        let mut messages: Vec<FeedMessage> = page
            .messages
            .into_iter()
            .map(|m| FeedMessage {
                cursor: m.cursor,
                sender: m.sender,
                text: m.text,
            })
            .collect();
        // Oldest first, regardless of how the API pages
        messages.sort_by_key(|m| m.cursor);
        Ok(messages)
    }

    async fn send(&self, conversation_id: Uuid, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url(conversation_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "type": "text", "content": text }))
            .send()
            .await
            .map_err(|e| SessionError::feed(format!("send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SessionError::feed(format!(
                "send returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
