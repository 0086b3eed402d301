//! Core `SessionManager` with the public management surface

mod core;
mod create;
mod lifecycle;
mod maintenance;
mod query;

pub use core::SessionManager;
