//! Manager structure and lifecycle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::feed::Feed;
use crate::store::SessionStore;

use super::super::session::SessionHandle;
use super::maintenance;

/// Registry and capacity authority for all sessions.
///
/// Owns the only mutable map of live sessions; every mutation happens under
/// one lock scope. Two process-wide periodic tasks run in the manager's
/// context: the heartbeat and the log retention sweep.
pub struct SessionManager {
    pub(super) registry: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) feed: Arc<dyn Feed>,
    pub(super) config: DaemonConfig,
    pub(super) started_at: Instant,
    heartbeat_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

impl SessionManager {
    /// Validate configuration, reconcile rows left over from a previous
    /// run, and start the periodic tasks.
    ///
    /// # Errors
    /// Returns `Validation` for a bad configuration or a store error from
    /// the startup reconcile.
    pub async fn start(
        store: Arc<dyn SessionStore>,
        feed: Arc<dyn Feed>,
        config: DaemonConfig,
    ) -> Result<Self> {
        config.validate()?;

        let reconciled = maintenance::reconcile_stale_sessions(store.as_ref()).await?;
        if reconciled > 0 {
            log::info!("Reconciled {reconciled} session(s) left active by a previous run");
        }

        let registry: Arc<Mutex<HashMap<Uuid, SessionHandle>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let heartbeat_task = tokio::spawn(maintenance::heartbeat_loop(
            Arc::clone(&registry),
            config.heartbeat_interval,
            config.chat_poll_interval * config.stale_multiplier,
        ));
        let sweep_task = tokio::spawn(maintenance::sweep_loop(
            Arc::clone(&store),
            config.log_cleanup_interval,
            config.log_retention,
        ));

        log::info!(
            "Session manager started (max {} concurrent sessions)",
            config.max_sessions
        );

        Ok(Self {
            registry,
            store,
            feed,
            config,
            started_at: Instant::now(),
            heartbeat_task,
            sweep_task,
        })
    }

    /// Stop every live session and cancel the periodic tasks.
    pub async fn shutdown(&self) {
        log::info!("Shutting down session manager");

        let ids: Vec<Uuid> = self.registry.lock().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop_session(id, true).await {
                log::warn!("Failed to stop session {id} during shutdown: {e}");
            }
        }

        self.heartbeat_task.abort();
        self.sweep_task.abort();
        log::info!("Session manager shutdown complete");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.heartbeat_task.abort();
        self.sweep_task.abort();
    }
}
