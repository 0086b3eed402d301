//! # claude-sessiond
//!
//! Supervision daemon for multiple concurrent Claude Code sessions. Each
//! session wraps one CLI subprocess speaking line-delimited stream-json,
//! bridged to a conversation on an external chat feed, with per-session
//! cost, status and history tracking.
//!
//! ## Architecture
//!
//! - [`transport`] - frames the JSON-line protocol over one subprocess
//! - [`bridge`] - relays messages between the chat feed and the transport
//! - [`manager`] - the session registry, state machines and periodic tasks
//! - [`store`] / [`feed`] - narrow seams onto persistence and the chat API
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use claude_sessiond::{DaemonConfig, HttpFeed, MemoryStore, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DaemonConfig::from_env();
//!     let store = Arc::new(MemoryStore::new());
//!     let feed = Arc::new(HttpFeed::new(
//!         config.chat_api_url.clone(),
//!         config.service_token.clone(),
//!         config.feed_request_timeout,
//!     )?);
//!
//!     let manager = SessionManager::start(store, feed, config).await?;
//!     // ... create sessions, serve the management surface ...
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod feed;
pub mod manager;
pub mod message;
pub mod store;
pub mod transport;
pub mod types;

pub use bridge::Bridge;
pub use config::DaemonConfig;
pub use error::{Result, SessionError};
pub use feed::{Feed, FeedMessage, HttpFeed};
pub use manager::SessionManager;
pub use message::parse_line;
pub use store::{MemoryStore, SessionStore};
pub use transport::{SpawnSpec, SubprocessTransport, TransportEvent};
pub use types::{
    CreateSessionRequest, LogEntry, LogLevel, LogSource, Message, OutboundMessage,
    SessionFilter, SessionRecord, SessionStats, SessionStatus,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
