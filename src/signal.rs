//! Per-session signal fan-out bus.
//!
//! Subscribers get their own bounded `mpsc` channel the way the teacher's
//! runtime hands each caller an `mpsc::Sender<RuntimeCommand>`; the
//! difference here is the fan-out direction and the backpressure policy: a
//! slow subscriber gets signals dropped rather than stalling the whole bus,
//! since one unresponsive listener must never block the command pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub const SCHEMA_VERSION: u32 = 1;

/// One fan-out message delivered to every live subscriber of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub schema_version: u32,
    pub session_id: String,
    pub sequence: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    /// Set when `payload` exceeded the configured cap and was replaced.
    pub truncated: bool,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Signal>,
}

/// Fan-out bus for one session. Cheap to construct; owned by the session's
/// command pipeline actor.
#[derive(Debug)]
pub struct SignalBus {
    session_id: String,
    max_queue_len: usize,
    payload_cap_bytes: usize,
    sequence: AtomicU64,
    next_subscriber_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl SignalBus {
    pub fn new(session_id: impl Into<String>, max_queue_len: usize, payload_cap_bytes: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_queue_len: max_queue_len.max(1),
            payload_cap_bytes,
            sequence: AtomicU64::new(0),
            next_subscriber_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber; returns its receiver and a handle it can
    /// use to unsubscribe.
    pub fn subscribe(&self) -> (mpsc::Receiver<Signal>, SubscriptionHandle) {
        let (tx, rx) = mpsc::channel(self.max_queue_len);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber { id, sender: tx });
        (rx, SubscriptionHandle { id })
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.subscribers.lock().unwrap().retain(|s| s.id != handle.id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Publish a signal to every live subscriber. Full inboxes are dropped
    /// silently (counted in the returned [`PublishReport`]); dead (closed)
    /// subscriber channels are pruned from the bus.
    pub fn publish(&self, kind: impl Into<String>, payload: serde_json::Value) -> PublishReport {
        let (payload, truncated) = self.cap_payload(payload);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let signal = Signal {
            schema_version: SCHEMA_VERSION,
            session_id: self.session_id.clone(),
            sequence,
            kind: kind.into(),
            payload,
            truncated,
        };

        let mut subscribers = self.subscribers.lock().unwrap();
        let mut delivered = 0usize;
        let mut dropped = 0usize;
        subscribers.retain(|sub| match sub.sender.try_send(signal.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        PublishReport {
            sequence,
            delivered,
            dropped,
        }
    }

    fn cap_payload(&self, payload: serde_json::Value) -> (serde_json::Value, bool) {
        let encoded = serde_json::to_vec(&payload).unwrap_or_default();
        if encoded.len() <= self.payload_cap_bytes {
            (payload, false)
        } else {
            (
                serde_json::json!({
                    "truncated_bytes": encoded.len(),
                    "cap_bytes": self.payload_cap_bytes,
                }),
                true,
            )
        }
    }
}

/// Handle returned by [`SignalBus::subscribe`]; pass back to `unsubscribe`.
pub struct SubscriptionHandle {
    id: u64,
}

/// Delivery accounting for one [`SignalBus::publish`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub sequence: u64,
    pub delivered: usize,
    pub dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_delivers_to_all_subscribers() {
        let bus = SignalBus::new("s1", 8, 1024);
        let (mut rx1, _h1) = bus.subscribe();
        let (mut rx2, _h2) = bus.subscribe();
        let report = bus.publish("edited", serde_json::json!({"ok": true}));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn full_subscriber_queue_drops_without_blocking() {
        let bus = SignalBus::new("s1", 1, 1024);
        let (_rx, _handle) = bus.subscribe();
        bus.publish("a", serde_json::json!(1));
        let report = bus.publish("b", serde_json::json!(2));
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_publish() {
        let bus = SignalBus::new("s1", 8, 1024);
        {
            let (_rx, _handle) = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish("a", serde_json::json!(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_handle() {
        let bus = SignalBus::new("s1", 8, 1024);
        let (_rx, handle) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.unsubscribe(&handle);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn oversized_payload_is_replaced_with_truncation_marker() {
        let bus = SignalBus::new("s1", 8, 8);
        let (mut rx, _handle) = bus.subscribe();
        bus.publish("big", serde_json::json!({"data": "x".repeat(100)}));
        let signal = rx.try_recv().unwrap();
        assert!(signal.truncated);
        assert!(signal.payload.get("truncated_bytes").is_some());
    }

    #[test]
    fn sequence_increments_monotonically() {
        let bus = SignalBus::new("s1", 8, 1024);
        let (mut rx, _handle) = bus.subscribe();
        bus.publish("a", serde_json::json!(1));
        bus.publish("b", serde_json::json!(2));
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence + 1, second.sequence);
    }
}
