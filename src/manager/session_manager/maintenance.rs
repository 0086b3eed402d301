//! Periodic maintenance: heartbeat, retention sweep, startup reconcile

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::store::SessionStore;
use crate::types::logs::{LogEntry, LogLevel, LogSource};
use crate::types::session::{SessionFilter, SessionStatus};

use super::super::commands::SessionCommand;
use super::super::session::SessionHandle;

/// Force rows left `starting|running|waiting` by a previous daemon run to
/// `error`. No subprocess survives a daemon restart, so any such row is
/// stale by definition. Runs before the manager accepts operations.
pub(super) async fn reconcile_stale_sessions(store: &dyn SessionStore) -> Result<usize> {
    let sessions = store.list_sessions(&SessionFilter::default()).await?;
    let mut reconciled = 0;

    for mut record in sessions {
        if !record.status.is_active() {
            continue;
        }
        let from = record.status;
        record.status = SessionStatus::Error;
        record.last_error = Some(String::from("stale on restart"));
        record.pid = None;
        store
            .append_log(&LogEntry::new(
                record.id,
                LogLevel::Warn,
                LogSource::System,
                format!("status {from} -> error: stale on restart"),
            ))
            .await?;
        store.upsert_session(&record).await?;
        reconciled += 1;
    }

    Ok(reconciled)
}

/// Periodic liveness check over every non-stopped session.
///
/// A bridged session is stale when neither its feed poll nor its transport
/// has made progress within `stale_after`; an unbridged session only while
/// `running`, since an idle `waiting` session legitimately produces no
/// events. The verdict is delivered as a command so the owning task applies
/// the transition itself.
pub(super) async fn heartbeat_loop(
    registry: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
    interval: Duration,
    stale_after: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let handles: Vec<SessionHandle> = registry.lock().await.values().cloned().collect();
        for handle in handles {
            let status = handle.status().await;
            if !status.is_active() {
                continue;
            }

            let event_elapsed = handle.last_event_at.lock().await.elapsed();
            let stale = match &handle.last_poll_at {
                Some(poll) => {
                    let poll_elapsed = poll.lock().await.elapsed();
                    poll_elapsed > stale_after && event_elapsed > stale_after
                }
                None => status == SessionStatus::Running && event_elapsed > stale_after,
            };

            if stale {
                log::warn!(
                    "Session {} silent for {event_elapsed:?}, marking stale",
                    handle.name
                );
                let _ = handle.command_tx.send(SessionCommand::MarkStale {
                    reason: format!("no activity for {event_elapsed:?}"),
                });
            }
        }
    }
}

/// Periodic deletion of log entries past the retention age, independent of
/// session state.
pub(super) async fn sweep_loop(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    retention: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let age = chrono::Duration::from_std(retention)
        .unwrap_or_else(|_| chrono::Duration::seconds(86_400));

    loop {
        ticker.tick().await;
        match store.delete_logs_older_than(age).await {
            Ok(0) => {}
            Ok(removed) => log::info!("Retention sweep removed {removed} log entries"),
            Err(e) => log::error!("Retention sweep failed: {e}"),
        }
    }
}
