//! Subprocess transport tests against scripted stand-ins for the CLI

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use claude_sessiond::transport::{SpawnSpec, SubprocessTransport, TransportEvent};
use claude_sessiond::types::messages::{Message, OutboundMessage};
use claude_sessiond::SessionError;

const EVENT_WAIT: Duration = Duration::from_secs(10);

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn spec(claude_bin: PathBuf, working_directory: &Path) -> SpawnSpec {
    SpawnSpec {
        claude_bin,
        working_directory: working_directory.to_path_buf(),
        system_prompt: None,
        write_timeout: Duration::from_secs(5),
        stop_grace_period: Duration::from_secs(3),
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream closed early")
}

#[tokio::test]
async fn echoes_user_frames_back() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nexec cat\n");
    let (mut transport, mut events) = SubprocessTransport::spawn(&spec(script, dir.path())).unwrap();

    assert!(transport.is_alive());
    assert!(transport.pid().is_some());

    transport.send(&OutboundMessage::user("ping")).await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::Message(Message::User { message }) => {
            assert_eq!(message.role, "user");
        }
        other => panic!("expected echoed user frame, got {other:?}"),
    }

    // Closing stdin is enough for cat to exit cleanly.
    let code = transport.stop(true).await.unwrap();
    assert_eq!(code, Some(0));
    assert!(!transport.is_alive());
}

#[tokio::test]
async fn reports_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nexit 7\n");
    let (mut transport, mut events) = SubprocessTransport::spawn(&spec(script, dir.path())).unwrap();

    loop {
        if let TransportEvent::Exited { code } = next_event(&mut events).await {
            assert_eq!(code, Some(7));
            break;
        }
    }

    assert!(!transport.is_alive());
    let err = transport.send(&OutboundMessage::user("too late")).await.unwrap_err();
    assert!(matches!(err, SessionError::BrokenPipe(_)));
}

#[tokio::test]
async fn surfaces_malformed_lines_and_keeps_reading() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        concat!(
            "#!/bin/sh\n",
            "printf 'this is not a frame\\n'\n",
            "printf '{\"type\":\"result\",\"result\":\"done\",\"total_cost_usd\":0.1}\\n'\n",
            "exec cat >/dev/null\n",
        ),
    );
    let (mut transport, mut events) = SubprocessTransport::spawn(&spec(script, dir.path())).unwrap();

    match next_event(&mut events).await {
        TransportEvent::Malformed { line } => assert_eq!(line, "this is not a frame"),
        other => panic!("expected malformed event, got {other:?}"),
    }
    match next_event(&mut events).await {
        TransportEvent::Message(Message::Result { result, .. }) => {
            assert_eq!(result.as_deref(), Some("done"));
        }
        other => panic!("expected result frame, got {other:?}"),
    }

    transport.stop(false).await.unwrap();
}

#[tokio::test]
async fn forwards_stderr_lines() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "#!/bin/sh\nprintf 'Error: credit exhausted\\n' >&2\nexec cat >/dev/null\n",
    );
    let (mut transport, mut events) = SubprocessTransport::spawn(&spec(script, dir.path())).unwrap();

    match next_event(&mut events).await {
        TransportEvent::Stderr(line) => assert_eq!(line, "Error: credit exhausted"),
        other => panic!("expected stderr event, got {other:?}"),
    }

    transport.stop(false).await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nexec cat >/dev/null\n");
    let (mut transport, _events) = SubprocessTransport::spawn(&spec(script, dir.path())).unwrap();

    let first = transport.stop(true).await.unwrap();
    let second = transport.stop(true).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn missing_binary_fails_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let err =
        SubprocessTransport::spawn(&spec(dir.path().join("no-such-cli"), dir.path())).unwrap_err();
    assert!(matches!(err, SessionError::Spawn(_)));
}

#[tokio::test]
async fn missing_working_directory_fails_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nexec cat\n");
    let err =
        SubprocessTransport::spawn(&spec(script, &dir.path().join("gone"))).unwrap_err();
    assert!(matches!(err, SessionError::Spawn(_)));
}
