//! Playback session signalling shared between the relay and the CLI.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

/// Progress signals for the single playback session of this process.
///
/// The embedded player page reports liveness through periodic heartbeats and
/// flags completion exactly once. The CLI side either polls (`is_finished`,
/// `idle_for`) or awaits (`finished`). Heartbeat reads are advisory; a stale
/// value is acceptable, so a plain lock over the instant is enough.
#[derive(Debug)]
pub struct PlaybackSession {
    last_heartbeat: RwLock<Option<Instant>>,
    finished_tx: watch::Sender<bool>,
}

impl PlaybackSession {
    #[must_use]
    pub fn new() -> Self {
        let (finished_tx, _) = watch::channel(false);
        Self {
            last_heartbeat: RwLock::new(None),
            finished_tx,
        }
    }

    /// Record a heartbeat at the current instant. Last write wins.
    pub fn mark_heartbeat(&self) {
        *self.last_heartbeat.write() = Some(Instant::now());
    }

    /// Instant of the most recent heartbeat, if one arrived yet.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        *self.last_heartbeat.read()
    }

    /// Time elapsed since the most recent heartbeat.
    #[must_use]
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_heartbeat().map(|at| at.elapsed())
    }

    /// Mark playback complete. The transition is one-way; later heartbeats
    /// never clear it.
    pub fn mark_finished(&self) {
        self.finished_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.finished_tx.borrow()
    }

    /// Wait until the finished flag is set. Returns immediately if it
    /// already is.
    pub async fn finished(&self) {
        let mut rx = self.finished_tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}
