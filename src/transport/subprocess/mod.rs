//! Subprocess transport for the Claude Code CLI

mod command;
mod reader;
mod transport;

pub use command::CommandBuilder;
pub use transport::{SpawnSpec, SubprocessTransport};
