//! Progress-line sinks.
//!
//! The orchestrator pushes human-readable progress strings through [`LogSink::emit`]
//! with no backpressure: emitting never blocks and never fails. Hosts fan the
//! lines out to the console ([`TracingLogSink`]), to live subscribers
//! ([`BattleFeed`]) or nowhere ([`NullLogSink`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Channel capacity for live subscribers. Slow subscribers lag, they never block.
const CHANNEL_CAPACITY: usize = 256;

/// Best-effort, fire-and-forget progress output.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn emit(&self, _line: &str) {}
}

/// Forwards lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn emit(&self, line: &str) {
        info!(target: "arena::battle", "{}", line);
    }
}

/// One line on the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLine {
    /// Monotonic per-feed sequence number, starting at 0.
    pub seq: u64,
    pub line: String,
    pub at: DateTime<Utc>,
}

/// Shared reference to a [`BattleFeed`].
pub type SharedBattleFeed = Arc<BattleFeed>;

/// Broadcast feed of sequenced progress lines for live subscribers.
pub struct BattleFeed {
    sender: broadcast::Sender<FeedLine>,
    next_seq: AtomicU64,
}

impl BattleFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> SharedBattleFeed {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedLine> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BattleFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for BattleFeed {
    fn emit(&self, line: &str) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = FeedLine {
            seq,
            line: line.to_string(),
            at: Utc::now(),
        };
        // No receivers is fine.
        if self.sender.send(entry).is_err() {
            debug!(seq, "feed line dropped (no subscribers)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let feed = BattleFeed::new();
        feed.emit("nobody listening");
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_sees_sequenced_lines() {
        let feed = BattleFeed::new().shared();
        let mut rx = feed.subscribe();

        feed.emit("first");
        feed.emit("second");

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!((a.seq, a.line.as_str()), (0, "first"));
        assert_eq!((b.seq, b.line.as_str()), (1, "second"));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let feed = BattleFeed::new();
        let mut rx = feed.subscribe();
        for i in 0..(CHANNEL_CAPACITY + 10) {
            feed.emit(&format!("line {}", i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_null_and_tracing_sinks_accept_lines() {
        NullLogSink.emit("dropped");
        TracingLogSink.emit("logged");
    }
}
