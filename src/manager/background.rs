//! Per-session background task
//!
//! One task per session owns the transport write half, the bridge, and the
//! authoritative session record. It drives the status machine from three
//! inputs: manager commands, transport events, and inbound feed messages.
//! Nothing else mutates session state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use crate::bridge::Bridge;
use crate::error::{Result, SessionError};
use crate::feed::FeedMessage;
use crate::store::SessionStore;
use crate::transport::{SubprocessTransport, TransportEvent};
use crate::types::logs::{LogEntry, LogLevel, LogSource};
use crate::types::messages::{Message, OutboundMessage};
use crate::types::session::{SessionRecord, SessionStatus};

use super::commands::SessionCommand;

/// Outbound chat posts are truncated so one turn cannot flood the feed.
const RELAY_TEXT_LIMIT: usize = 2000;
/// Stderr excerpts relayed to the feed are kept short.
const RELAY_ERROR_LIMIT: usize = 500;

/// State owned by one session task.
pub(super) struct SessionTask {
    pub record: SessionRecord,
    pub status: Arc<Mutex<SessionStatus>>,
    pub last_event_at: Arc<Mutex<Instant>>,
    pub store: Arc<dyn SessionStore>,
    pub transport: SubprocessTransport,
    pub bridge: Option<Bridge>,
    pub spawn_timeout: Duration,
    /// Outstanding turns: outbound user frames not yet answered by a result
    pub pending_sends: u32,
}

/// Spawn the session's event loop.
pub(super) fn spawn_session_task(
    task: SessionTask,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    inbound_rx: mpsc::Receiver<FeedMessage>,
) {
    tokio::spawn(run(task, command_rx, event_rx, inbound_rx));
}

async fn run(
    mut task: SessionTask,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut inbound_rx: mpsc::Receiver<FeedMessage>,
) {
    let spawn_deadline = tokio::time::sleep(task.spawn_timeout);
    tokio::pin!(spawn_deadline);

    loop {
        let starting = *task.status.lock().await == SessionStatus::Starting;

        tokio::select! {
            Some(cmd) = command_rx.recv() => match cmd {
                SessionCommand::SendMessage { content, response_tx } => {
                    let result = task.inject(&content).await;
                    let _ = response_tx.send(result);
                }
                SessionCommand::Stop { graceful, response_tx } => {
                    let result = task.stop(graceful).await;
                    let _ = response_tx.send(result);
                    break;
                }
                SessionCommand::MarkStale { reason } => {
                    task.fail(&reason).await;
                }
            },
            Some(event) = event_rx.recv() => {
                task.handle_transport_event(event).await;
            }
            Some(message) = inbound_rx.recv() => {
                task.handle_feed_message(message).await;
            }
            () = &mut spawn_deadline, if starting => {
                task.fail(&format!(
                    "no frame from subprocess within {:?}",
                    task.spawn_timeout
                ))
                .await;
            }
            else => break,
        }
    }
}

impl SessionTask {
    /// Explicit inject from the manager; valid only while active.
    async fn inject(&mut self, content: &str) -> Result<()> {
        let status = *self.status.lock().await;
        if !status.is_active() {
            return Err(SessionError::invalid_state(
                status.as_str(),
                "cannot send to a session that is not active",
            ));
        }
        self.send_user(content).await
    }

    /// Frame `content` as a user message and write it to the subprocess.
    async fn send_user(&mut self, content: &str) -> Result<()> {
        match self.transport.send(&OutboundMessage::user(content)).await {
            Ok(()) => {
                self.pending_sends += 1;
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Info,
                    LogSource::Stdin,
                    content,
                ))
                .await;
                self.touch().await;
                if *self.status.lock().await == SessionStatus::Waiting {
                    self.transition(SessionStatus::Running, "new outbound work")
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                if e.is_transport_fault() {
                    self.fail(&format!("send failed: {e}")).await;
                }
                Err(e)
            }
        }
    }

    /// Inbound feed message: logged, then forwarded to the subprocess in
    /// retrieval order.
    async fn handle_feed_message(&mut self, message: FeedMessage) {
        let line = match &message.sender {
            Some(sender) => format!("{sender}: {}", message.text),
            None => message.text.clone(),
        };
        self.log(LogEntry::new(
            self.record.id,
            LogLevel::Info,
            LogSource::Chat,
            line.as_str(),
        ))
        .await;

        let status = *self.status.lock().await;
        if status.is_active() {
            // Failure here already drove the session to error inside
            // send_user; the feed message stays in the log for replay.
            let _ = self.send_user(&line).await;
        } else {
            log::debug!(
                "[{}] dropping feed message in state {status}",
                self.record.name
            );
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => {
                self.touch().await;
                if *self.status.lock().await == SessionStatus::Starting {
                    self.transition(SessionStatus::Running, "first frame exchange")
                        .await;
                }
                self.handle_message(message).await;
            }
            TransportEvent::Malformed { line } => {
                log::warn!("[{}] malformed frame: {line}", self.record.name);
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Warn,
                    LogSource::Stdout,
                    format!("malformed frame: {line}"),
                ))
                .await;
            }
            TransportEvent::Stderr(line) => {
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Error,
                    LogSource::Stderr,
                    line.as_str(),
                ))
                .await;
                if line.to_lowercase().contains("error") {
                    self.relay(format!(
                        "[{}] ERROR: {}",
                        self.record.name,
                        truncate(&line, RELAY_ERROR_LIMIT)
                    ));
                }
            }
            TransportEvent::Exited { code } => {
                self.handle_exit(code).await;
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        match message {
            Message::Result {
                result,
                total_cost_usd,
                ..
            } => {
                self.handle_result(result, total_cost_usd).await;
            }
            Message::Assistant { .. } => {
                let tools: Vec<String> = message
                    .tool_uses()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                for tool in &tools {
                    self.record.tool_calls += 1;
                    self.log(
                        LogEntry::new(
                            self.record.id,
                            LogLevel::Info,
                            LogSource::Stdout,
                            format!("tool invocation: {tool}"),
                        )
                        .with_tool(tool.clone()),
                    )
                    .await;
                }
                if let Some(text) = message.assistant_text() {
                    self.log(LogEntry::new(
                        self.record.id,
                        LogLevel::Info,
                        LogSource::Stdout,
                        text.as_str(),
                    ))
                    .await;
                    self.relay(format!(
                        "[{}] {}",
                        self.record.name,
                        truncate(&text, RELAY_TEXT_LIMIT)
                    ));
                }
                if !tools.is_empty() {
                    self.persist().await;
                }
            }
            Message::System { subtype, .. } => {
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Debug,
                    LogSource::Stdout,
                    format!("system frame: {subtype}"),
                ))
                .await;
            }
            Message::User { .. } => {
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Debug,
                    LogSource::Stdout,
                    "echoed user frame",
                ))
                .await;
            }
            Message::Other(value) => {
                let kind = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<missing>");
                self.log(LogEntry::new(
                    self.record.id,
                    LogLevel::Info,
                    LogSource::Stdout,
                    format!("unrecognized frame type: {kind}"),
                ))
                .await;
            }
        }
    }

    /// A result frame completes the outstanding turn: cost and message
    /// accounting advance, and a ceiling breach forces `error` before the
    /// turn's content is relayed outward.
    async fn handle_result(&mut self, result: Option<String>, total_cost_usd: Option<f64>) {
        self.pending_sends = self.pending_sends.saturating_sub(1);

        let turn_cost = total_cost_usd.unwrap_or(0.0).max(0.0);
        self.record.total_cost_usd += turn_cost;
        self.record.message_count += 1;
        let total = self.record.total_cost_usd;

        let text = result.unwrap_or_default();
        self.log(
            LogEntry::new(
                self.record.id,
                LogLevel::Info,
                LogSource::Stdout,
                if text.is_empty() {
                    "(empty result)"
                } else {
                    text.as_str()
                },
            )
            .with_cost(turn_cost),
        )
        .await;

        if total > self.record.max_cost_usd {
            self.fail(&format!(
                "cost limit reached: ${total:.4} exceeds ceiling ${:.4}",
                self.record.max_cost_usd
            ))
            .await;
            return;
        }

        self.persist().await;

        if !text.is_empty() {
            self.relay(format!(
                "[{}] {}",
                self.record.name,
                truncate(&text, RELAY_TEXT_LIMIT)
            ));
        }
        if self.pending_sends == 0 {
            self.transition(SessionStatus::Waiting, "turn complete, awaiting input")
                .await;
        }
    }

    async fn handle_exit(&mut self, code: Option<i32>) {
        let status = *self.status.lock().await;
        if !status.is_active() {
            // Exit observed after we already stopped or failed the session
            log::debug!("[{}] subprocess exit in state {status}", self.record.name);
            return;
        }

        let reason = match (code, self.pending_sends) {
            (Some(c), 0) => format!("subprocess exited with code {c}"),
            (Some(c), n) => format!("subprocess exited with code {c} ({n} send(s) pending)"),
            (None, _) => String::from("subprocess terminated by signal"),
        };
        self.fail(&reason).await;
    }

    /// Drive the session to `error`, stop the subprocess, and notify the
    /// feed. The session retains its cost/count snapshot and full log
    /// history until explicitly stopped or deleted.
    async fn fail(&mut self, reason: &str) {
        if !self.transition(SessionStatus::Error, reason).await {
            return;
        }
        let _ = self.transport.stop(false).await;
        self.relay(format!("[{}] {reason}", self.record.name));
        if let Some(bridge) = &self.bridge {
            bridge.stop();
        }
    }

    /// Explicit stop, honored from any live state; graceful drain first.
    async fn stop(&mut self, graceful: bool) -> Result<()> {
        if let Some(bridge) = &self.bridge {
            bridge.stop();
        }
        let _ = self.transport.stop(graceful).await;
        self.transition(SessionStatus::Stopped, "explicit stop").await;
        Ok(())
    }

    /// Apply a status transition if the table allows it. Appends exactly
    /// one system log entry per applied transition and persists the record.
    async fn transition(&mut self, to: SessionStatus, reason: &str) -> bool {
        let from = {
            let mut status = self.status.lock().await;
            let from = *status;
            if !from.can_transition(to) {
                log::warn!(
                    "[{}] rejected transition {from} -> {to}: {reason}",
                    self.record.name
                );
                return false;
            }
            *status = to;
            from
        };

        self.record.status = to;
        let now = Utc::now();
        match to {
            SessionStatus::Running => {
                if self.record.started_at.is_none() {
                    self.record.started_at = Some(now);
                }
            }
            SessionStatus::Error => {
                self.record.last_error = Some(reason.to_string());
            }
            SessionStatus::Stopped => {
                self.record.stopped_at = Some(now);
                self.record.pid = None;
            }
            _ => {}
        }

        log::info!("[{}] {from} -> {to}: {reason}", self.record.name);
        self.log(LogEntry::new(
            self.record.id,
            LogLevel::Info,
            LogSource::System,
            format!("status {from} -> {to}: {reason}"),
        ))
        .await;
        self.persist().await;
        true
    }

    /// Queue text for the feed; a session without a bridge logs and drops.
    fn relay(&self, text: String) {
        if let Some(bridge) = &self.bridge {
            bridge.relay(text);
        }
    }

    async fn touch(&mut self) {
        *self.last_event_at.lock().await = Instant::now();
        self.record.last_activity_at = Some(Utc::now());
    }

    async fn log(&self, entry: LogEntry) {
        if let Err(e) = self.store.append_log(&entry).await {
            log::error!("[{}] failed to append log: {e}", self.record.name);
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.store.upsert_session(&self.record).await {
            log::error!("[{}] failed to persist session: {e}", self.record.name);
        }
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}
