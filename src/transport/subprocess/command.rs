//! CLI command building for the subprocess transport

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Builds the Claude CLI invocation for a session.
///
/// The CLI is always launched in streaming JSON mode on both stdin and
/// stdout, with verbose output so lifecycle frames are emitted.
pub struct CommandBuilder<'a> {
    cli_path: &'a Path,
    working_directory: &'a Path,
    system_prompt: Option<&'a str>,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(
        cli_path: &'a Path,
        working_directory: &'a Path,
        system_prompt: Option<&'a str>,
    ) -> Self {
        Self {
            cli_path,
            working_directory,
            system_prompt,
        }
    }

    /// Build the complete CLI command with all arguments and piped stdio.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.cli_path);

        cmd.arg("--input-format")
            .arg("stream-json")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            // Sessions run headless; there is nobody to answer prompts
            .arg("--dangerously-skip-permissions");

        if let Some(prompt) = self.system_prompt {
            cmd.arg("--system-prompt").arg(prompt);
        }

        cmd.current_dir(self.working_directory);

        // Pipe stderr rather than inheriting so the child cannot touch the
        // daemon's terminal and its output lands in the session log.
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

/// Resolve the Claude CLI binary.
///
/// An explicit path wins if it exists; otherwise the name is resolved via
/// `PATH`, falling back to common install locations.
pub(super) fn resolve_cli(configured: &Path) -> Option<PathBuf> {
    if configured.is_absolute() && configured.is_file() {
        return Some(configured.to_path_buf());
    }
    if configured.components().count() > 1 {
        // Relative path with directories; only valid if it points at a file
        return configured.is_file().then(|| configured.to_path_buf());
    }

    if let Ok(path) = which::which(configured) {
        return Some(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| String::from("/root"));
    let locations = [
        PathBuf::from(&home).join(".npm-global/bin/claude"),
        PathBuf::from("/usr/local/bin/claude"),
        PathBuf::from(&home).join(".local/bin/claude"),
        PathBuf::from(&home).join("node_modules/.bin/claude"),
        PathBuf::from(&home).join(".yarn/bin/claude"),
    ];
    locations.into_iter().find(|p| p.is_file())
}
