//! Event-handler wiring
//!
//! Subscribes the decoupled concerns (metrics, UI state, audit logging)
//! to the engine's lifecycle events. This is the only place that knows all
//! three exist.

use event_bus::{EventBus, EventKind};
use orchestrator::{SchedulerMetrics, StateObserver, StateTracker};
use prodline_types::{STATION_CAM, STATION_PACK};
use state_machine::ProductState;
use std::sync::Arc;

/// Register every event handler on the bus.
pub fn register_event_handlers(
    bus: &EventBus,
    tracker: Arc<StateTracker>,
    metrics: SchedulerMetrics,
) {
    // --- Metrics handlers ---
    {
        let metrics = metrics.clone();
        bus.subscribe(EventKind::ProductCompleted, move |event| {
            metrics
                .tasks_processed_total
                .with_label_values(&["success", &event.product_type])
                .inc();
        });
    }
    {
        let metrics = metrics.clone();
        bus.subscribe(EventKind::ProductFailed, move |event| {
            metrics
                .tasks_processed_total
                .with_label_values(&["failed", &event.product_type])
                .inc();
        });
    }
    {
        bus.subscribe(EventKind::StepCompleted, move |event| {
            if let (Some(station_id), Some(duration)) = (&event.station_id, event.duration_secs) {
                metrics
                    .station_processing_duration
                    .with_label_values(&[station_id])
                    .observe(duration);
            }
        });
    }

    // --- UI state handlers ---
    {
        let tracker = tracker.clone();
        bus.subscribe(EventKind::ProductStarted, move |event| {
            tracker.update_product_state(
                &event.product_id,
                STATION_CAM,
                ProductState::Processing.as_str(),
            );
        });
    }
    {
        let tracker = tracker.clone();
        bus.subscribe(EventKind::StepStarted, move |event| {
            if let Some(station_id) = &event.station_id {
                tracker.update_product_state(
                    &event.product_id,
                    station_id,
                    ProductState::Processing.as_str(),
                );
            }
        });
    }
    {
        let tracker = tracker.clone();
        bus.subscribe(EventKind::ProductCompleted, move |event| {
            tracker.update_product_state(
                &event.product_id,
                STATION_PACK,
                ProductState::Completed.as_str(),
            );
        });
    }
    {
        let tracker = tracker.clone();
        bus.subscribe(EventKind::ProductFailed, move |event| {
            tracker.update_product_state(&event.product_id, "", ProductState::Failed.as_str());
        });
    }
    {
        let tracker = tracker.clone();
        bus.subscribe(EventKind::ProductCompensated, move |event| {
            tracker.update_product_state(
                &event.product_id,
                "",
                ProductState::Compensated.as_str(),
            );
        });
    }

    // --- Audit log handlers ---
    bus.subscribe(EventKind::ProductCompleted, |event| {
        tracing::info!(product_id = %event.product_id, "product completed");
    });
    bus.subscribe(EventKind::ProductFailed, |event| {
        tracing::error!(
            product_id = %event.product_id,
            error = event.error.as_deref().unwrap_or("unknown"),
            "product failed"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::ProductEvent;
    use prodline_types::Order;
    use prometheus::Registry;
    use std::time::Duration;

    #[tokio::test]
    async fn events_drive_tracker_and_metrics() {
        let bus = EventBus::new();
        let tracker = Arc::new(StateTracker::new());
        let registry = Registry::new();
        let metrics = SchedulerMetrics::new(&registry).unwrap();

        register_event_handlers(&bus, tracker.clone(), metrics.clone());

        tracker.add_product(&Order::new("A", "PCB_PROTOTYPE", 0));

        bus.publish(ProductEvent::new(EventKind::ProductStarted, "A", "PCB_PROTOTYPE"));
        bus.publish(
            ProductEvent::new(EventKind::StepCompleted, "A", "PCB_PROTOTYPE")
                .with_station("STATION_CAM")
                .with_duration(0.5),
        );
        bus.publish(ProductEvent::new(EventKind::ProductCompleted, "A", "PCB_PROTOTYPE"));

        tokio::time::sleep(Duration::from_millis(80)).await;

        let view = tracker.snapshot().products["A"].clone();
        assert_eq!(view.status, "COMPLETED");
        assert_eq!(view.station, STATION_PACK);

        assert_eq!(
            metrics.tasks_processed_total.with_label_values(&["success", "PCB_PROTOTYPE"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn failure_events_mark_failed_then_compensated() {
        let bus = EventBus::new();
        let tracker = Arc::new(StateTracker::new());
        let metrics = SchedulerMetrics::new(&Registry::new()).unwrap();

        register_event_handlers(&bus, tracker.clone(), metrics.clone());
        tracker.add_product(&Order::new("B", "PCB_DOUBLE_LAYER", 0));

        bus.publish(
            ProductEvent::new(EventKind::ProductFailed, "B", "PCB_DOUBLE_LAYER")
                .with_error("e-test defect"),
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(tracker.snapshot().products["B"].status, "FAILED");

        bus.publish(ProductEvent::new(EventKind::ProductCompensated, "B", "PCB_DOUBLE_LAYER"));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(tracker.snapshot().products["B"].status, "COMPENSATED");

        assert_eq!(
            metrics.tasks_processed_total.with_label_values(&["failed", "PCB_DOUBLE_LAYER"]).get(),
            1
        );
    }
}
