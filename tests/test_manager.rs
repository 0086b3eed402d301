//! End-to-end session manager tests against scripted CLI stand-ins

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use claude_sessiond::feed::{Feed, FeedMessage};
use claude_sessiond::store::{MemoryStore, SessionStore};
use claude_sessiond::types::session::{
    CreateSessionRequest, SessionFilter, SessionRecord, SessionStatus,
};
use claude_sessiond::{DaemonConfig, Result, SessionError, SessionManager};

/// Prints one init frame then swallows stdin, staying alive until stopped.
const IDLE_CLI: &str = "#!/bin/sh\n\
    printf '{\"type\":\"system\",\"subtype\":\"init\"}\\n'\n\
    exec cat >/dev/null\n";

/// Answers every stdin line with a result frame costing $6.00.
const COSTLY_CLI: &str = "#!/bin/sh\n\
    printf '{\"type\":\"system\",\"subtype\":\"init\"}\\n'\n\
    while read -r line; do\n\
    printf '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"turn done\",\"total_cost_usd\":6.0,\"is_error\":false,\"num_turns\":1}\\n'\n\
    done\n";

/// Answers the first stdin line with a $6.00 result whose text must never
/// reach the feed when the ceiling is breached.
const BREACHING_CLI: &str = "#!/bin/sh\n\
    printf '{\"type\":\"system\",\"subtype\":\"init\"}\\n'\n\
    while read -r line; do\n\
    printf '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"quarterly numbers attached\",\"total_cost_usd\":6.0,\"is_error\":false,\"num_turns\":1}\\n'\n\
    done\n";

/// Dies immediately, before producing any frame.
const CRASHING_CLI: &str = "#!/bin/sh\nexit 3\n";

struct NullFeed;

#[async_trait]
impl Feed for NullFeed {
    async fn poll(&self, _conversation_id: Uuid, _since: Option<u64>) -> Result<Vec<FeedMessage>> {
        Ok(Vec::new())
    }

    async fn send(&self, _conversation_id: Uuid, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Healthy feed with an empty conversation; records everything posted.
#[derive(Default)]
struct RecordingFeed {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Feed for RecordingFeed {
    async fn poll(&self, _conversation_id: Uuid, _since: Option<u64>) -> Result<Vec<FeedMessage>> {
        Ok(Vec::new())
    }

    async fn send(&self, _conversation_id: Uuid, text: &str) -> Result<()> {
        self.sent.lock().await.push(text.to_string());
        Ok(())
    }
}

/// Feed whose polls always fail, so a bridged session never sees poll
/// progress. Posts are accepted.
struct UnreachableFeed;

#[async_trait]
impl Feed for UnreachableFeed {
    async fn poll(&self, _conversation_id: Uuid, _since: Option<u64>) -> Result<Vec<FeedMessage>> {
        Err(SessionError::feed("scripted outage"))
    }

    async fn send(&self, _conversation_id: Uuid, _text: &str) -> Result<()> {
        Ok(())
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn config(dir: &Path, claude_bin: PathBuf) -> DaemonConfig {
    DaemonConfig {
        claude_bin,
        log_dir: dir.to_path_buf(),
        working_dir: dir.to_path_buf(),
        chat_poll_interval: Duration::from_millis(100),
        // Keep the periodic tasks out of short test runs
        heartbeat_interval: Duration::from_secs(3_600),
        log_cleanup_interval: Duration::from_secs(3_600),
        spawn_timeout: Duration::from_secs(30),
        stop_grace_period: Duration::from_secs(2),
        write_timeout: Duration::from_secs(5),
        ..DaemonConfig::default()
    }
}

fn request(name: &str, dir: &Path) -> CreateSessionRequest {
    CreateSessionRequest {
        name: name.to_string(),
        user_id: Uuid::new_v4(),
        conversation_id: None,
        task: None,
        working_directory: dir.to_path_buf(),
        system_prompt: None,
        max_cost_usd: None,
    }
}

async fn start_manager(
    store: Arc<MemoryStore>,
    config: DaemonConfig,
) -> SessionManager {
    start_manager_with_feed(store, Arc::new(NullFeed), config).await
}

async fn start_manager_with_feed(
    store: Arc<MemoryStore>,
    feed: Arc<dyn Feed>,
    config: DaemonConfig,
) -> SessionManager {
    SessionManager::start(store, feed, config).await.unwrap()
}

/// Heartbeat every 100ms, staleness after 500ms of silence.
fn heartbeat_config(dir: &Path, claude_bin: PathBuf) -> DaemonConfig {
    DaemonConfig {
        heartbeat_interval: Duration::from_millis(100),
        stale_multiplier: 5,
        ..config(dir, claude_bin)
    }
}

async fn wait_for_status(manager: &SessionManager, id: Uuid, want: SessionStatus) -> SessionRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = manager.get_session(id).await.unwrap();
        if record.status == want {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for status {want}, stuck at {}",
            record.status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let id = manager
        .create_session(request("round-trip", dir.path()))
        .await
        .unwrap();

    // Running after the first frame
    let record = wait_for_status(&manager, id, SessionStatus::Running).await;
    assert!(record.pid.is_some());
    assert!(record.started_at.is_some());
    assert_eq!(record.total_cost_usd, 0.0);

    manager.stop_session(id, true).await.unwrap();
    let record = manager.get_session(id).await.unwrap();
    assert_eq!(record.status, SessionStatus::Stopped);
    assert!(record.stopped_at.is_some());
    assert!(record.pid.is_none());

    // Status history lands in the log
    let logs = manager.get_session_logs(id, 100).await.unwrap();
    assert!(logs.iter().any(|e| e.content.contains("-> running")));
    assert!(logs.iter().any(|e| e.content.contains("-> stopped")));

    manager.delete_session(id).await.unwrap();
    assert!(matches!(
        manager.get_session(id).await,
        Err(SessionError::SessionNotFound(_))
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn capacity_counts_only_active_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let mut cfg = config(dir.path(), script);
    cfg.max_sessions = 1;
    let manager = start_manager(Arc::new(MemoryStore::new()), cfg).await;

    let first = manager
        .create_session(request("cap-one", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, first, SessionStatus::Running).await;

    let err = manager
        .create_session(request("cap-two", dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::CapacityExceeded(1)));

    // A stopped session frees its slot
    manager.stop_session(first, false).await.unwrap();
    manager
        .create_session(request("cap-two", dir.path()))
        .await
        .unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn name_conflict_excludes_stopped_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let first = manager
        .create_session(request("alpha", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, first, SessionStatus::Running).await;

    match manager.create_session(request("alpha", dir.path())).await {
        Err(SessionError::NameConflict(name)) => assert_eq!(name, "alpha"),
        other => panic!("expected name conflict, got {other:?}"),
    }

    manager.stop_session(first, false).await.unwrap();
    manager
        .create_session(request("alpha", dir.path()))
        .await
        .unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn rejects_invalid_requests() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let mut bad = request("", dir.path());
    assert!(matches!(
        manager.create_session(bad).await,
        Err(SessionError::Validation(_))
    ));

    bad = request("bad-ceiling", dir.path());
    bad.max_cost_usd = Some(-5.0);
    assert!(matches!(
        manager.create_session(bad).await,
        Err(SessionError::Validation(_))
    ));

    bad = request("bad-dir", dir.path());
    bad.working_directory = dir.path().join("missing");
    assert!(matches!(
        manager.create_session(bad).await,
        Err(SessionError::Validation(_))
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn delete_requires_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let id = manager
        .create_session(request("undeletable", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    assert!(matches!(
        manager.delete_session(id).await,
        Err(SessionError::InvalidState { .. })
    ));

    manager.stop_session(id, false).await.unwrap();
    manager.delete_session(id).await.unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn cost_ceiling_forces_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), COSTLY_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let mut req = request("spender", dir.path());
    req.max_cost_usd = Some(10.0);
    let id = manager.create_session(req).await.unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    // First turn: $6.00 total, under the $10.00 ceiling
    manager.send_to_session(id, "turn one").await.unwrap();
    let record = wait_for_status(&manager, id, SessionStatus::Waiting).await;
    assert!((record.total_cost_usd - 6.0).abs() < 1e-9);
    assert_eq!(record.message_count, 1);

    // Second turn pushes the total to $12.00, past the ceiling
    manager.send_to_session(id, "turn two").await.unwrap();
    let record = wait_for_status(&manager, id, SessionStatus::Error).await;
    assert!((record.total_cost_usd - 12.0).abs() < 1e-9);
    assert!(record.last_error.unwrap().contains("cost limit"));

    // An error session no longer accepts input
    assert!(matches!(
        manager.send_to_session(id, "turn three").await,
        Err(SessionError::InvalidState { .. })
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn subprocess_crash_drives_session_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), CRASHING_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let id = manager
        .create_session(request("crasher", dir.path()))
        .await
        .unwrap();
    let record = wait_for_status(&manager, id, SessionStatus::Error).await;
    assert!(record.last_error.unwrap().contains("exited with code 3"));
    manager.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_leaves_error_row() {
    let dir = tempfile::tempdir().unwrap();
    let manager = start_manager(
        Arc::new(MemoryStore::new()),
        config(dir.path(), dir.path().join("missing-cli")),
    )
    .await;

    let err = manager
        .create_session(request("never-started", dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Spawn(_)));

    let rows = manager.list_sessions(&SessionFilter::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SessionStatus::Error);
    assert!(rows[0].last_error.as_deref().unwrap().contains("not found"));
    manager.shutdown().await;
}

#[tokio::test]
async fn restart_reconciles_sessions_left_active() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let store = Arc::new(MemoryStore::new());

    // A row left running by a previous daemon run
    let id = Uuid::new_v4();
    let mut stale = SessionRecord::new(&request("leftover", dir.path()), id, 10.0);
    stale.status = SessionStatus::Running;
    stale.pid = Some(4242);
    store.upsert_session(&stale).await.unwrap();

    let manager = start_manager(Arc::clone(&store), config(dir.path(), script)).await;

    let record = manager.get_session(id).await.unwrap();
    assert_eq!(record.status, SessionStatus::Error);
    assert_eq!(record.last_error.as_deref(), Some("stale on restart"));
    assert!(record.pid.is_none());

    // Reconciled rows can be stopped and deleted without a live task
    manager.stop_session(id, true).await.unwrap();
    assert_eq!(
        manager.get_session(id).await.unwrap().status,
        SessionStatus::Stopped
    );
    manager.delete_session(id).await.unwrap();
    manager.shutdown().await;
}

#[tokio::test]
async fn heartbeat_marks_silent_running_session_stale() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(
        Arc::new(MemoryStore::new()),
        heartbeat_config(dir.path(), script),
    )
    .await;

    let id = manager
        .create_session(request("goes-quiet", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    // No sends, no frames: the heartbeat must fail the session.
    let record = wait_for_status(&manager, id, SessionStatus::Error).await;
    assert!(record.last_error.unwrap().contains("no activity"));
    manager.shutdown().await;
}

#[tokio::test]
async fn heartbeat_spares_idle_waiting_session() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), COSTLY_CLI);
    let manager = start_manager(
        Arc::new(MemoryStore::new()),
        heartbeat_config(dir.path(), script),
    )
    .await;

    let id = manager
        .create_session(request("patient", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;
    manager.send_to_session(id, "one turn").await.unwrap();
    wait_for_status(&manager, id, SessionStatus::Waiting).await;

    // Idle well past the staleness window; waiting for input is not a fault.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(
        manager.get_session(id).await.unwrap().status,
        SessionStatus::Waiting
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn heartbeat_trusts_poll_progress_on_bridged_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager_with_feed(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingFeed::default()),
        heartbeat_config(dir.path(), script),
    )
    .await;

    let mut req = request("bridged-quiet", dir.path());
    req.conversation_id = Some(Uuid::new_v4());
    let id = manager.create_session(req).await.unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    // The transport is silent but the feed keeps answering polls, so the
    // session is live by the bridged criterion.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(
        manager.get_session(id).await.unwrap().status,
        SessionStatus::Running
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn heartbeat_fails_bridged_session_when_feed_and_transport_silent() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager_with_feed(
        Arc::new(MemoryStore::new()),
        Arc::new(UnreachableFeed),
        heartbeat_config(dir.path(), script),
    )
    .await;

    let mut req = request("bridged-dead", dir.path());
    req.conversation_id = Some(Uuid::new_v4());
    let id = manager.create_session(req).await.unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    let record = wait_for_status(&manager, id, SessionStatus::Error).await;
    assert!(record.last_error.unwrap().contains("no activity"));
    manager.shutdown().await;
}

#[tokio::test]
async fn cost_breach_suppresses_turn_relay() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), BREACHING_CLI);
    let feed = Arc::new(RecordingFeed::default());
    let manager = start_manager_with_feed(
        Arc::new(MemoryStore::new()),
        Arc::clone(&feed) as Arc<dyn Feed>,
        config(dir.path(), script),
    )
    .await;

    let mut req = request("overspender", dir.path());
    req.conversation_id = Some(Uuid::new_v4());
    req.max_cost_usd = Some(5.0);
    let id = manager.create_session(req).await.unwrap();
    wait_for_status(&manager, id, SessionStatus::Running).await;

    // One $6.00 turn against a $5.00 ceiling
    manager.send_to_session(id, "spend").await.unwrap();
    let record = wait_for_status(&manager, id, SessionStatus::Error).await;
    assert!((record.total_cost_usd - 6.0).abs() < 1e-9);

    // The cost-limit notification reaches the feed; the breaching turn's
    // text never does.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let sent = feed.sent.lock().await;
        if sent.iter().any(|post| post.contains("cost limit")) {
            assert!(!sent.iter().any(|post| post.contains("quarterly numbers")));
            break;
        }
        drop(sent);
        assert!(
            tokio::time::Instant::now() < deadline,
            "cost-limit notification never posted"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // Nothing further is relayed after the breach
    tokio::time::sleep(Duration::from_millis(300)).await;
    let sent = feed.sent.lock().await;
    assert!(!sent.iter().any(|post| post.contains("quarterly numbers")));
    manager.shutdown().await;
}

#[tokio::test]
async fn stats_reflect_session_states() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), IDLE_CLI);
    let manager = start_manager(Arc::new(MemoryStore::new()), config(dir.path(), script)).await;

    let a = manager
        .create_session(request("stats-a", dir.path()))
        .await
        .unwrap();
    let b = manager
        .create_session(request("stats-b", dir.path()))
        .await
        .unwrap();
    wait_for_status(&manager, a, SessionStatus::Running).await;
    wait_for_status(&manager, b, SessionStatus::Running).await;
    manager.stop_session(b, false).await.unwrap();

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.running_sessions, 1);
    assert_eq!(stats.stopped_sessions, 1);
    assert_eq!(stats.max_allowed, 10);
    manager.shutdown().await;
}
