//! Per-run signal queue (spec §4.E).
//!
//! Enqueue is non-blocking; `get_signals(filter)` drains and consumes
//! in priority order, not arrival order. Many producers (HTTP
//! handlers, scheduler, webhook router), one consumer (the runner).

use std::collections::{BinaryHeap, HashMap};

use parking_lot::Mutex;

use sa_domain::signal::{Signal, SignalFilter};

#[derive(Default)]
pub struct SignalQueues {
    queues: Mutex<HashMap<String, BinaryHeap<Signal>>>,
}

impl SignalQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a signal for `run_id`. Signals delivered to a run with
    /// no tracked queue (e.g. a terminal run that was never
    /// registered) are silently dropped (spec §4.E).
    pub fn enqueue(&self, run_id: &str, signal: Signal) {
        let mut queues = self.queues.lock();
        queues.entry(run_id.to_owned()).or_default().push(signal);
    }

    /// Drain and return all signals admitted by `filter`, in priority
    /// order. Non-admitted signals stay queued for a later `ALL` poll.
    pub fn drain(&self, run_id: &str, filter: SignalFilter) -> Vec<Signal> {
        let mut queues = self.queues.lock();
        let Some(heap) = queues.get_mut(run_id) else { return Vec::new() };

        let mut taken = Vec::new();
        let mut held_back = BinaryHeap::new();
        while let Some(signal) = heap.pop() {
            if filter.admits(&signal) {
                taken.push(signal);
            } else {
                held_back.push(signal);
            }
        }
        *heap = held_back;
        taken
    }

    /// Drop a run's queue entirely (on terminal transition).
    pub fn clear(&self, run_id: &str) {
        self.queues.lock().remove(run_id);
    }

    pub fn pending_count(&self, run_id: &str) -> usize {
        self.queues.lock().get(run_id).map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_filter_drains_only_kill_and_pause_in_priority_order() {
        let q = SignalQueues::new();
        q.enqueue("r1", Signal::UserMessage { content: "hi".into() });
        q.enqueue("r1", Signal::Pause);
        q.enqueue("r1", Signal::Kill);
        q.enqueue("r1", Signal::Resume);

        let control = q.drain("r1", SignalFilter::Control);
        assert!(matches!(control[0], Signal::Kill));
        assert!(matches!(control[1], Signal::Pause));
        assert_eq!(control.len(), 2);

        // Remaining signals still queued for an ALL poll.
        assert_eq!(q.pending_count("r1"), 2);
        let rest = q.drain("r1", SignalFilter::All);
        assert!(matches!(rest[0], Signal::Resume));
        assert!(matches!(rest[1], Signal::UserMessage { .. }));
    }

    #[test]
    fn enqueue_to_unknown_run_then_drain_is_empty() {
        let q = SignalQueues::new();
        assert!(q.drain("ghost", SignalFilter::All).is_empty());
    }

    #[test]
    fn clear_drops_all_pending() {
        let q = SignalQueues::new();
        q.enqueue("r1", Signal::Kill);
        q.clear("r1");
        assert_eq!(q.pending_count("r1"), 0);
        assert!(q.drain("r1", SignalFilter::All).is_empty());
    }

    #[test]
    fn priority_ordering_stable_across_enqueue_order() {
        let q = SignalQueues::new();
        q.enqueue("r1", Signal::Resume);
        q.enqueue("r1", Signal::WebhookResponse { payload: serde_json::json!({}) });
        q.enqueue("r1", Signal::Kill);
        let all = q.drain("r1", SignalFilter::All);
        assert!(matches!(all[0], Signal::Kill));
        assert!(matches!(all[1], Signal::WebhookResponse { .. }));
        assert!(matches!(all[2], Signal::Resume));
    }
}
