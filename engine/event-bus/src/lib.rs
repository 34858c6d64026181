//! # Event bus
//!
//! In-process publish/subscribe decoupling the workflow engine from its
//! side effects (metrics, UI state, audit logging). Publishing never
//! blocks: each handler runs on its own tokio task, and no ordering is
//! guaranteed between handlers of one event or across events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Lifecycle event kinds emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ProductStarted,
    StepStarted,
    StepCompleted,
    ProductCompleted,
    ProductFailed,
    ProductCompensated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProductStarted => "ProductStarted",
            EventKind::StepStarted => "StepStarted",
            EventKind::StepCompleted => "StepCompleted",
            EventKind::ProductCompleted => "ProductCompleted",
            EventKind::ProductFailed => "ProductFailed",
            EventKind::ProductCompensated => "ProductCompensated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shallow, immutable event payload.
///
/// Subscribers run concurrently with the worker that owns the order, so
/// the payload carries scalars only, never a reference to the live order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEvent {
    pub kind: EventKind,
    pub product_id: String,
    pub product_type: String,

    /// Station involved, for step-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,

    /// First failure, for `ProductFailed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Station execution time in seconds, for `StepCompleted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl ProductEvent {
    pub fn new(kind: EventKind, product_id: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            kind,
            product_id: product_id.into(),
            product_type: product_type.into(),
            station_id: None,
            error: None,
            duration_secs: None,
        }
    }

    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }
}

type Handler = Arc<dyn Fn(ProductEvent) + Send + Sync>;

/// Topic-keyed in-process event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(ProductEvent) + Send + Sync + 'static) {
        self.handlers.write().unwrap().entry(kind).or_default().push(Arc::new(handler));
    }

    /// Publish an event. Handlers are dispatched on their own tasks; the
    /// publisher returns immediately.
    pub fn publish(&self, event: ProductEvent) {
        let handlers: Vec<Handler> = {
            let table = self.handlers.read().unwrap();
            match table.get(&event.kind) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        tracing::trace!(kind = %event.kind, product_id = %event.product_id, "publishing event");
        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn handlers_receive_matching_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count2 = count.clone();
        bus.subscribe(EventKind::ProductCompleted, move |event| {
            assert_eq!(event.product_id, "A");
            count2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(ProductEvent::new(EventKind::ProductCompleted, "A", "PCB_PROTOTYPE"));
        bus.publish(ProductEvent::new(EventKind::ProductFailed, "A", "PCB_PROTOTYPE"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_fire() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(EventKind::StepStarted, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(
            ProductEvent::new(EventKind::StepStarted, "A", "PCB_PROTOTYPE")
                .with_station("STATION_CAM"),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(ProductEvent::new(EventKind::ProductStarted, "A", "PCB_PROTOTYPE"));
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_publisher() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::ProductCompleted, move |_| {
            std::thread::sleep(Duration::from_millis(200));
        });

        let started = std::time::Instant::now();
        bus.publish(ProductEvent::new(EventKind::ProductCompleted, "A", "PCB_PROTOTYPE"));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
