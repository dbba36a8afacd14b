//! # Progress Broadcaster
//!
//! Per-run observer registry. Every observer owns an unbounded channel, so
//! publishing never blocks and each observer sees events in publication
//! order. A closed observer is pruned and never affects the others.
//!
//! ```text
//! Orchestrator ── publish(run, event) ──▶ ProgressBroadcaster
//!                                            ├──▶ observer 1 (WebSocket)
//!                                            ├──▶ observer 2 (SSE)
//!                                            └──▶ observer 3 (status tracker)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::events::ProgressEvent;

/// Identifies one subscription
pub type ObserverId = u64;

/// Receiving half of a subscription
#[derive(Debug)]
pub struct Subscription {
    pub run_id: String,
    pub id: ObserverId,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    /// Next event, or `None` once the run's observers are closed
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Process-scoped registry of run observers
#[derive(Debug, Default)]
pub struct ProgressBroadcaster {
    observers: Mutex<HashMap<String, Vec<(ObserverId, mpsc::UnboundedSender<ProgressEvent>)>>>,
    next_id: AtomicU64,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> MutexGuard<'_, HashMap<String, Vec<(ObserverId, mpsc::UnboundedSender<ProgressEvent>)>>>
    {
        // The map stays consistent even if a holder panicked
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe a new observer to `run_id`
    pub fn subscribe(&self, run_id: &str) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe_sender(run_id, tx);
        Subscription {
            run_id: run_id.to_string(),
            id,
            receiver,
        }
    }

    /// Register an existing sender as an observer of `run_id`
    pub fn subscribe_sender(
        &self,
        run_id: &str,
        sender: mpsc::UnboundedSender<ProgressEvent>,
    ) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(run_id.to_string())
            .or_default()
            .push((id, sender));
        tracing::debug!(run_id = %run_id, observer = id, "Observer subscribed");
        id
    }

    /// Remove one observer. Returns whether it was still registered;
    /// repeated calls are harmless.
    pub fn unsubscribe(&self, run_id: &str, observer: ObserverId) -> bool {
        let mut observers = self.lock();
        let Some(list) = observers.get_mut(run_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != observer);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.remove(run_id);
        }
        if removed {
            tracing::debug!(run_id = %run_id, observer = observer, "Observer unsubscribed");
        }
        removed
    }

    /// Deliver `event` to every observer of `run_id`. Returns the number of
    /// observers that received it.
    pub fn publish(&self, run_id: &str, event: &ProgressEvent) -> usize {
        let mut observers = self.lock();
        let Some(list) = observers.get_mut(run_id) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|(id, tx)| match tx.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(run_id = %run_id, observer = *id, "Pruning closed observer");
                false
            }
        });
        if list.is_empty() {
            observers.remove(run_id);
        }
        delivered
    }

    /// Drop every observer of `run_id`, ending their subscriptions
    pub fn close_run(&self, run_id: &str) -> usize {
        self.lock().remove(run_id).map(|list| list.len()).unwrap_or(0)
    }

    pub fn observer_count(&self, run_id: &str) -> usize {
        self.lock().get(run_id).map(|list| list.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::EventKind;
    use crate::pipeline::stage::PipelinePhase;
    use chrono::Utc;

    fn event(seq: u64, percent: u8) -> ProgressEvent {
        ProgressEvent {
            kind: EventKind::Progress,
            run_id: "run-a".to_string(),
            seq,
            stage: PipelinePhase::GenerateUi,
            percent,
            message: format!("step {}", seq),
            sub_activity: None,
            eta_seconds: None,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_in_order_to_all_observers() {
        let broadcaster = ProgressBroadcaster::new();
        let mut first = broadcaster.subscribe("run-a");
        let mut second = broadcaster.subscribe("run-a");

        for seq in 0..5 {
            assert_eq!(broadcaster.publish("run-a", &event(seq, seq as u8 * 10)), 2);
        }

        for sub in [&mut first, &mut second] {
            for seq in 0..5 {
                assert_eq!(sub.recv().await.unwrap().seq, seq);
            }
        }
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let broadcaster = ProgressBroadcaster::new();
        let mut a = broadcaster.subscribe("run-a");
        let mut b = broadcaster.subscribe("run-b");

        broadcaster.publish("run-a", &event(0, 5));
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let broadcaster = ProgressBroadcaster::new();
        let first = broadcaster.subscribe("run-a");
        let _second = broadcaster.subscribe("run-a");

        assert!(broadcaster.unsubscribe("run-a", first.id));
        assert!(!broadcaster.unsubscribe("run-a", first.id));
        assert_eq!(broadcaster.observer_count("run-a"), 1);
    }

    #[test]
    fn test_closed_observer_does_not_block_others() {
        let broadcaster = ProgressBroadcaster::new();
        let dropped = broadcaster.subscribe("run-a");
        let mut live = broadcaster.subscribe("run-a");
        drop(dropped);

        assert_eq!(broadcaster.publish("run-a", &event(0, 5)), 1);
        assert_eq!(live.try_recv().unwrap().seq, 0);
        assert_eq!(broadcaster.observer_count("run-a"), 1);
    }

    #[tokio::test]
    async fn test_close_run_ends_subscriptions() {
        let broadcaster = ProgressBroadcaster::new();
        let mut sub = broadcaster.subscribe("run-a");
        broadcaster.publish("run-a", &event(0, 5));

        assert_eq!(broadcaster.close_run("run-a"), 1);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
