//! Subprocess transport implementation

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Result, SessionError};
use crate::transport::TransportEvent;
use crate::types::messages::OutboundMessage;

use super::command::{CommandBuilder, resolve_cli};
use super::reader;

/// Everything needed to launch one subprocess.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Claude CLI executable (name or path)
    pub claude_bin: PathBuf,
    /// Working directory for the process
    pub working_directory: PathBuf,
    /// Custom initial instructions, passed as `--system-prompt`
    pub system_prompt: Option<String>,
    /// Bounded deadline for a single stdin write
    pub write_timeout: Duration,
    /// Grace period between stdin close and forced kill on stop
    pub stop_grace_period: Duration,
}

/// Write half and supervision handles for one Claude subprocess.
///
/// The read half lives in a background task that emits [`TransportEvent`]s
/// through the receiver returned by [`SubprocessTransport::spawn`]; the
/// event stream terminates with exactly one `Exited` event.
#[derive(Debug)]
pub struct SubprocessTransport {
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    write_timeout: Duration,
    stop_grace_period: Duration,
    kill_tx: Option<oneshot::Sender<()>>,
    exited_rx: watch::Receiver<Option<i32>>,
}

impl SubprocessTransport {
    /// Spawn the subprocess described by `spec`.
    ///
    /// # Errors
    /// Returns [`SessionError::Spawn`] when the binary cannot be resolved,
    /// the working directory is missing, or the process fails to launch.
    pub fn spawn(spec: &SpawnSpec) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let cli_path = resolve_cli(&spec.claude_bin).ok_or_else(|| {
            SessionError::spawn(format!(
                "Claude CLI not found: {}",
                spec.claude_bin.display()
            ))
        })?;

        if !spec.working_directory.is_dir() {
            return Err(SessionError::spawn(format!(
                "Working directory does not exist: {}",
                spec.working_directory.display()
            )));
        }

        let builder = CommandBuilder::new(
            &cli_path,
            &spec.working_directory,
            spec.system_prompt.as_deref(),
        );
        let mut child = builder
            .build()
            .spawn()
            .map_err(|e| SessionError::spawn(format!("Failed to start Claude CLI: {e}")))?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::spawn("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::spawn("Failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::spawn("Failed to get stderr handle"))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(None);

        reader::spawn_stderr_task(stderr, event_tx.clone());
        reader::spawn_reader_task(child, stdout, kill_rx, event_tx, exited_tx);

        Ok((
            Self {
                stdin: Some(stdin),
                pid,
                write_timeout: spec.write_timeout,
                stop_grace_period: spec.stop_grace_period,
                kill_tx: Some(kill_tx),
                exited_rx,
            },
            event_rx,
        ))
    }

    /// Serialize `message` as one JSON line and write it to stdin.
    ///
    /// # Errors
    /// `BrokenPipe` if the subprocess has exited or stdin is closed;
    /// `WriteTimeout` if the bounded write deadline elapses.
    pub async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(SessionError::broken_pipe("subprocess has exited"));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SessionError::broken_pipe("stdin already closed"))?;

        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let write = async {
            stdin.write_all(&line).await?;
            stdin.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(SessionError::broken_pipe(e.to_string()))
            }
            Ok(Err(e)) => Err(SessionError::Io(e)),
            Err(_) => Err(SessionError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Request termination. Graceful stop closes stdin and waits out the
    /// grace period before killing; `graceful = false` kills immediately.
    /// Idempotent once the process has exited.
    pub async fn stop(&mut self, graceful: bool) -> Result<Option<i32>> {
        if let Some(code) = *self.exited_rx.borrow() {
            return Ok(Some(code));
        }

        // Closing stdin is the polite termination signal for a stream-json
        // CLI: it drains in-flight work and exits on its own.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        if graceful {
            let wait = self
                .exited_rx
                .wait_for(|status| status.is_some());
            if let Ok(Ok(status)) = tokio::time::timeout(self.stop_grace_period, wait).await {
                return Ok(*status);
            }
            log::warn!("Subprocess (pid {:?}) did not stop gracefully, killing", self.pid);
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        let wait = self.exited_rx.wait_for(|status| status.is_some());
        match tokio::time::timeout(Duration::from_secs(5), wait).await {
            Ok(Ok(status)) => Ok(*status),
            _ => Ok(None),
        }
    }

    /// Whether the subprocess is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.exited_rx.borrow().is_none()
    }

    /// Subprocess id, if the process launched.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}
