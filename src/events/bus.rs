//! # Event bus for broadcasting task lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (driver, task watchers,
//! subscriber workers) and any number of independent subscriptions.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriptions (many):
//!   Driver        ──┐               ┌──► Bus::stream(ctx) ──► TaskEvents caller 1
//!   Exit watcher 1──┼────► Bus ─────┼──► Bus::stream(ctx) ──► TaskEvents caller N
//!   Exit watcher N──┘ (broadcast)   └──► subscriber_listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers skip the oldest items; producers are never stalled.
//! - **No persistence**: events are lost if there are no active subscribers at send time.
//! - **Closing**: a stream closes when its own context or the driver token is cancelled.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::event::TaskEvent;

/// Per-stream buffer between the forwarding activity and the caller.
const STREAM_BUFFER: usize = 64;

/// Broadcast channel for task events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<TaskEvent>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-subscriber).
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<TaskEvent>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped (this function still returns immediately).
    pub fn publish(&self, ev: TaskEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new raw receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Opens a subscription that lives until `ctx` or `shutdown` is cancelled.
    ///
    /// A dedicated activity forwards bus events into the returned receiver. When
    /// either token fires, or the caller drops the receiver, the activity ends and
    /// the receiver observes end-of-stream.
    pub fn stream(
        &self,
        ctx: CancellationToken,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<TaskEvent> {
        let mut rx = self.subscribe();
        let (tx, out) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => ev,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "task event stream lagged; oldest events dropped");
                            continue;
                        }
                    }
                };

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    sent = tx.send(ev) => if sent.is_err() { break },
                }
            }
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_stream_receives_events_after_subscribe() {
        let bus = Bus::new(16);
        let mut stream = bus.stream(CancellationToken::new(), CancellationToken::new());

        bus.publish(TaskEvent::new(EventKind::TaskStarted).with_task("a"));
        let ev = stream.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::TaskStarted);
        assert_eq!(ev.task.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_stream_closes_on_context_cancel() {
        let bus = Bus::new(16);
        let ctx = CancellationToken::new();
        let mut stream = bus.stream(ctx.clone(), CancellationToken::new());

        ctx.cancel();
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_closes_on_shutdown() {
        let bus = Bus::new(16);
        let shutdown = CancellationToken::new();
        let mut stream = bus.stream(CancellationToken::new(), shutdown.clone());

        shutdown.cancel();
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_stream_does_not_block_others() {
        let bus = Bus::new(4);
        let _idle = bus.stream(CancellationToken::new(), CancellationToken::new());
        let mut active = bus.stream(CancellationToken::new(), CancellationToken::new());

        for i in 0..32 {
            bus.publish(TaskEvent::new(EventKind::SignalSent).with_task(format!("t{i}")));
            let ev = active.recv().await.expect("event");
            assert_eq!(ev.task.as_deref(), Some(format!("t{i}").as_str()));
        }
    }
}
