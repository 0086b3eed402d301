//! Feed bridge
//!
//! Keeps one session's conversation synchronized with the chat feed: a
//! poll loop pulls new inbound messages toward the subprocess, and a relay
//! loop pushes subprocess output back out. The two directions are
//! independent tasks so feed unavailability can never stall subprocess
//! draining.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::feed::{Feed, FeedMessage};

/// Relay retry schedule: bounded exponential backoff.
const RELAY_MAX_ATTEMPTS: u32 = 5;
const RELAY_BASE_BACKOFF: Duration = Duration::from_millis(500);
const RELAY_MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Handle to one session's feed bridge.
///
/// Inbound messages are handed off through the channel given to
/// [`Bridge::start`]; the cursor advances only after a successful hand-off,
/// so delivery toward the subprocess is at-least-once.
pub struct Bridge {
    outbound_tx: mpsc::UnboundedSender<String>,
    poll_task: JoinHandle<()>,
    relay_task: JoinHandle<()>,
    cursor: Arc<Mutex<Option<u64>>>,
    last_poll_at: Arc<Mutex<Instant>>,
}

impl Bridge {
    /// Start the poll and relay loops for `conversation_id`.
    pub fn start(
        feed: Arc<dyn Feed>,
        conversation_id: Uuid,
        inbound_tx: mpsc::Sender<FeedMessage>,
        poll_interval: Duration,
    ) -> Self {
        let cursor = Arc::new(Mutex::new(None));
        let last_poll_at = Arc::new(Mutex::new(Instant::now()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let poll_task = tokio::spawn(poll_loop(
            Arc::clone(&feed),
            conversation_id,
            inbound_tx,
            poll_interval,
            Arc::clone(&cursor),
            Arc::clone(&last_poll_at),
        ));
        let relay_task = tokio::spawn(relay_loop(feed, conversation_id, outbound_rx));

        Self {
            outbound_tx,
            poll_task,
            relay_task,
            cursor,
            last_poll_at,
        }
    }

    /// Queue `text` for posting to the feed. Never blocks; the relay loop
    /// retries delivery with bounded backoff.
    pub fn relay(&self, text: impl Into<String>) {
        let _ = self.outbound_tx.send(text.into());
    }

    /// Last observed feed cursor.
    pub async fn cursor(&self) -> Option<u64> {
        *self.cursor.lock().await
    }

    /// When the poll loop last completed a successful poll.
    pub async fn last_poll_at(&self) -> Instant {
        *self.last_poll_at.lock().await
    }

    /// Shared handle onto the poll-progress timestamp, for liveness checks.
    #[must_use]
    pub fn poll_progress(&self) -> Arc<Mutex<Instant>> {
        Arc::clone(&self.last_poll_at)
    }

    /// Stop polling. The relay loop keeps draining already-queued posts;
    /// anything still queued when the bridge is dropped is discarded.
    pub fn stop(&self) {
        self.poll_task.abort();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.poll_task.abort();
        self.relay_task.abort();
    }
}

async fn poll_loop(
    feed: Arc<dyn Feed>,
    conversation_id: Uuid,
    inbound_tx: mpsc::Sender<FeedMessage>,
    poll_interval: Duration,
    cursor: Arc<Mutex<Option<u64>>>,
    last_poll_at: Arc<Mutex<Instant>>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let since = *cursor.lock().await;
        match feed.poll(conversation_id, since).await {
            Ok(messages) => {
                *last_poll_at.lock().await = Instant::now();
                for message in messages {
                    let position = message.cursor;
                    if inbound_tx.send(message).await.is_err() {
                        // Session side is gone; nothing left to bridge
                        return;
                    }
                    *cursor.lock().await = Some(position);
                }
            }
            Err(e) => {
                log::warn!("Feed poll failed for conversation {conversation_id}: {e}");
            }
        }
    }
}

async fn relay_loop(
    feed: Arc<dyn Feed>,
    conversation_id: Uuid,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = outbound_rx.recv().await {
        let mut backoff = RELAY_BASE_BACKOFF;
        for attempt in 1..=RELAY_MAX_ATTEMPTS {
            match feed.send(conversation_id, &text).await {
                Ok(()) => break,
                Err(e) if attempt == RELAY_MAX_ATTEMPTS => {
                    log::error!(
                        "Dropping outbound post for conversation {conversation_id} \
                         after {RELAY_MAX_ATTEMPTS} attempts: {e}"
                    );
                }
                Err(e) => {
                    log::warn!("Feed send failed (attempt {attempt}): {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, RELAY_MAX_BACKOFF);
                }
            }
        }
    }
}
