//! Process-wide event broadcaster. Owns the only truly shared in-memory
//! state of the core: a monotonic `seq` counter and a ring buffer for
//! backfill. Publishers never block on subscribers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_BACKFILL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    AnomalyDetected { anomaly_id: i64, table: String, r#type: String },
    IncidentCreated { incident_id: i64, severity: String, table: String, r#type: String },
    IncidentUpdated { incident_id: i64, status: String, severity: String },
    ScanCompleted { tables_scanned: u32, anomalies_found: u32, duration_ms: u64 },
    DiscoveryUpdate { connection_id: i64, total_deltas: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

pub struct Notifier {
    sender: broadcast::Sender<NotifierEvent>,
    next_seq: std::sync::atomic::AtomicU64,
    backfill: Mutex<VecDeque<NotifierEvent>>,
    backfill_capacity: usize,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_BACKFILL_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize, backfill_capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(channel_capacity);
        Self {
            sender,
            next_seq: std::sync::atomic::AtomicU64::new(1),
            backfill: Mutex::new(VecDeque::with_capacity(backfill_capacity)),
            backfill_capacity,
        }
    }

    /// Non-blocking: a full channel with no subscribers simply drops the
    /// send (no subscribers to lag); a slow subscriber falls behind and
    /// later observes `RecvError::Lagged` on its own receive call.
    pub fn publish(&self, payload: EventPayload) -> u64 {
        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let event = NotifierEvent { seq, payload };

        {
            let mut backfill = self.backfill.lock().unwrap();
            if backfill.len() >= self.backfill_capacity {
                backfill.pop_front();
            }
            backfill.push_back(event.clone());
        }

        // Err here only means zero current subscribers; not an error for the publisher.
        let _ = self.sender.send(event);
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.sender.subscribe()
    }

    /// Events with `seq > since`, oldest first, bounded by what the ring
    /// buffer still retains.
    pub fn backfill_since(&self, since: u64) -> Vec<NotifierEvent> {
        let backfill = self.backfill.lock().unwrap();
        backfill.iter().filter(|e| e.seq > since).cloned().collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic_and_starts_at_one() {
        let notifier = Notifier::new();
        let s1 = notifier.publish(EventPayload::ScanCompleted {
            tables_scanned: 1,
            anomalies_found: 0,
            duration_ms: 10,
        });
        let s2 = notifier.publish(EventPayload::ScanCompleted {
            tables_scanned: 2,
            anomalies_found: 1,
            duration_ms: 20,
        });
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[test]
    fn backfill_returns_events_after_cursor_in_order() {
        let notifier = Notifier::new();
        for i in 0..5u32 {
            notifier.publish(EventPayload::ScanCompleted {
                tables_scanned: i,
                anomalies_found: 0,
                duration_ms: 0,
            });
        }
        let events = notifier.backfill_since(2);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq, 3);
        assert_eq!(events.last().unwrap().seq, 5);
    }

    #[test]
    fn backfill_ring_buffer_is_bounded() {
        let notifier = Notifier::with_capacity(16, 3);
        for i in 0..5u32 {
            notifier.publish(EventPayload::ScanCompleted {
                tables_scanned: i,
                anomalies_found: 0,
                duration_ms: 0,
            });
        }
        let events = notifier.backfill_since(0);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq, 3);
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_seq_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.publish(EventPayload::ScanCompleted {
            tables_scanned: 1,
            anomalies_found: 0,
            duration_ms: 0,
        });
        notifier.publish(EventPayload::ScanCompleted {
            tables_scanned: 2,
            anomalies_found: 0,
            duration_ms: 0,
        });
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }
}
