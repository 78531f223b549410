//! Domain event publishing
//!
//! The engine hands events to a publisher and moves on; delivery to viewers,
//! notification fan-out and analytics ingestion live behind this trait.
//! Publishing is fire-and-forget from the engine's perspective: a publisher
//! must not fail the operation that produced the event.

use crate::domain::SessionEvent;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SessionEvent);
}

/// Publisher that emits events to the tracing pipeline as structured JSON.
/// Useful as a default for embedders that wire real transports elsewhere.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: SessionEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "session event"),
            Err(e) => warn!(event = event.name(), error = %e, "failed to encode session event"),
        }
    }
}

/// Publisher that records events in memory. Used by the test suites to assert
/// exactly-once emission (settlements, sold-out notifications).
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<SessionEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().expect("publisher lock poisoned").clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: SessionEvent) {
        self.events.lock().expect("publisher lock poisoned").push(event);
    }
}
