//! Read loops for subprocess stdout and stderr

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::SessionError;
use crate::message::parse_line;
use crate::transport::TransportEvent;

/// Spawn the stdout read loop.
///
/// Owns the child handle: after the output stream closes it reaps the
/// process and emits the terminal `Exited` event. A kill request arriving
/// through `kill_rx` forces termination without tearing down the loop, so
/// the exit code is still observed and reported.
pub(super) fn spawn_reader_task(
    mut child: Child,
    stdout: ChildStdout,
    mut kill_rx: oneshot::Receiver<()>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    exited_tx: watch::Sender<Option<i32>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut killed = false;

        loop {
            tokio::select! {
                kill = &mut kill_rx, if !killed => {
                    killed = true;
                    if kill.is_ok() {
                        let _ = child.start_kill();
                    }
                }
                next = lines.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            let event = match parse_line(trimmed) {
                                Ok(message) => TransportEvent::Message(message),
                                Err(SessionError::MalformedFrame { line }) => {
                                    TransportEvent::Malformed { line }
                                }
                                Err(e) => {
                                    log::warn!("Unexpected parse failure: {e}");
                                    continue;
                                }
                            };
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            // A truncated trailing line surfaces here; it is
                            // discarded with a warning, not treated as fatal.
                            log::warn!("Error reading subprocess stdout: {e}");
                            break;
                        }
                    }
                }
            }
        }

        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                log::error!("Failed to reap subprocess: {e}");
                None
            }
        };
        let _ = exited_tx.send(Some(code.unwrap_or(-1)));
        let _ = event_tx.send(TransportEvent::Exited { code });
    });
}

/// Spawn the stderr read loop; one `Stderr` event per non-empty line.
pub(super) fn spawn_stderr_task(
    stderr: ChildStderr,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if event_tx
                .send(TransportEvent::Stderr(trimmed.to_string()))
                .is_err()
            {
                break;
            }
        }
    });
}
