//! Non-blocking fan-out of coordinator lifecycle events.
//!
//! The bus wraps a bounded broadcast channel: publishing never blocks the
//! coordinator, and a subscriber that falls behind loses the oldest unread
//! events, which are tallied on a shared drop counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentDiscovered,
    StateChanged,
    WorkAssigned,
    DeliveryFailed,
    PipelineStageDone,
    PipelineDone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl CoordinatorEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            pane_id: None,
            work_id: None,
            details: Map::new(),
        }
    }

    #[must_use]
    pub fn pane(mut self, pane_id: impl Into<String>) -> Self {
        self.pane_id = Some(pane_id.into());
        self
    }

    #[must_use]
    pub fn work(mut self, work_id: impl Into<String>) -> Self {
        self.work_id = Some(work_id.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Bounded, lossy event fan-out. Cloneable; all clones share the channel
/// and the drop counter.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
    dropped: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event. Never blocks; having no subscribers is fine.
    pub fn publish(&self, event: CoordinatorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Total events lost across all lagging subscribers.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One subscriber's view of the bus. Lag is absorbed here: overflow drops
/// the oldest unread events and bumps the shared counter.
pub struct EventStream {
    rx: broadcast::Receiver<CoordinatorEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Receive the next event, skipping over any dropped backlog. Returns
    /// `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive for polling contexts.
    pub fn try_recv(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                }
                Err(_) => return None,
            }
        }
    }
}
