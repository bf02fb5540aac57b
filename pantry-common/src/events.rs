//! Enrichment progress events
//!
//! Broadcast channel carrying run and batch milestones from the enrichment
//! driver to whoever is listening (CLI progress output, tests). Emission is
//! lossy: having no subscriber is normal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::RecordSource;

/// Running counters carried by progress events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub records_seen: u64,
    pub updated: u64,
    pub skipped: u64,
    pub unresolved: u64,
    pub errored: u64,
}

/// Events emitted during an enrichment run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    /// Run started (after the registry was loaded)
    RunStarted {
        run_id: Uuid,
        job_name: String,
        source: RecordSource,
        workers: usize,
        canonical_count: usize,
        mapping_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One batch written and checkpointed
    BatchCompleted {
        run_id: Uuid,
        partition: usize,
        last_id: i64,
        batch_size: usize,
        counters: ProgressCounters,
        timestamp: DateTime<Utc>,
    },

    /// New canonical ingredient created mid-run
    CanonicalCreated {
        run_id: Uuid,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Run finished, either completed or cancelled
    RunFinished {
        run_id: Uuid,
        completed: bool,
        counters: ProgressCounters,
        elapsed_seconds: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`EnrichmentEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EnrichmentEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EnrichmentEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(EnrichmentEvent::CanonicalCreated {
            run_id: Uuid::new_v4(),
            name: "tahini".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        bus.emit_lossy(EnrichmentEvent::RunFinished {
            run_id,
            completed: true,
            counters: ProgressCounters {
                records_seen: 3,
                updated: 2,
                skipped: 1,
                ..Default::default()
            },
            elapsed_seconds: 0.5,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            EnrichmentEvent::RunFinished { run_id: id, completed, counters, .. } => {
                assert_eq!(id, run_id);
                assert!(completed);
                assert_eq!(counters.updated, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EnrichmentEvent::CanonicalCreated {
            run_id: Uuid::nil(),
            name: "sorghum flour".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CanonicalCreated");
        assert_eq!(json["name"], "sorghum flour");
    }
}
