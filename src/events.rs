//! Ordered stage event publication.
//!
//! [`StageEventBus`] mirrors the external event-stream lifecycle it serves:
//! at most one subscriber, silently replaced by a new `subscribe` call.
//! `publish` is fire-and-forget for the caller (it may run on a backend
//! thread); a dedicated delivery task forwards stages to the subscriber in
//! publish order, so delivery is never concurrent and never reordered.
//! Consecutive identical stages are not collapsed.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::Stage;

/// Receiving side of a [`StageEventBus`] subscription.
pub struct StageSubscription {
    rx: mpsc::UnboundedReceiver<Stage>,
}

impl StageSubscription {
    /// Next published stage, or `None` once this subscription has been
    /// replaced or the bus dropped.
    pub async fn next(&mut self) -> Option<Stage> {
        self.rx.recv().await
    }
}

type SubscriberSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Stage>>>>;

/// Single-subscriber broadcast of tunnel stages.
pub struct StageEventBus {
    tx: mpsc::UnboundedSender<Stage>,
    last: Mutex<Stage>,
    subscriber: SubscriberSlot,
    delivery: JoinHandle<()>,
}

impl StageEventBus {
    /// Create the bus and start its delivery task. Must be called from within
    /// a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Stage>();
        let subscriber: SubscriberSlot = Arc::new(Mutex::new(None));

        let delivery = tokio::spawn({
            let subscriber = subscriber.clone();
            async move {
                while let Some(stage) = rx.recv().await {
                    let mut slot = subscriber.lock().unwrap();
                    if let Some(sink) = slot.as_ref() {
                        if sink.send(stage).is_err() {
                            // Subscription dropped without an unsubscribe.
                            *slot = None;
                        }
                    }
                }
            }
        });

        StageEventBus {
            tx,
            last: Mutex::new(Stage::Unknown),
            subscriber,
            delivery,
        }
    }

    /// Queue `stage` for delivery and remember it for replay.
    pub fn publish(&self, stage: Stage) {
        debug!(stage = %stage, "publishing stage");
        *self.last.lock().unwrap() = stage;
        let _ = self.tx.send(stage);
    }

    /// Subscribe to stage events, silently replacing any prior subscriber.
    pub fn subscribe(&self) -> StageSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap() = Some(tx);
        StageSubscription { rx }
    }

    /// Drop the current subscriber, if any.
    pub fn unsubscribe(&self) {
        *self.subscriber.lock().unwrap() = None;
    }

    /// Last published stage, for replay to late callers.
    pub fn last_stage(&self) -> Stage {
        *self.last.lock().unwrap()
    }
}

impl Default for StageEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StageEventBus {
    fn drop(&mut self) {
        self.delivery.abort();
    }
}
