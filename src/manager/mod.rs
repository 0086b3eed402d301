//! Session supervision
//!
//! `SessionManager` is the registry and capacity authority for all
//! sessions. Each session runs as one background task owning its transport
//! and bridge, driven through a command channel.
//!
//! # Module Structure
//!
//! - `session_manager` - Core `SessionManager` with the public API
//! - `session` - Registry handle with shared status and activity snapshots
//! - `commands` - Command protocol for session tasks
//! - `background` - The per-session state machine task

mod background;
mod commands;
mod session;
mod session_manager;

pub use session_manager::SessionManager;
