//! Prometheus metrics for the scheduler and stations

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

/// Metric set shared by the scheduler and the event handlers.
///
/// Created against a registry passed by construction; nothing global.
#[derive(Clone)]
pub struct SchedulerMetrics {
    /// Orders currently waiting in the priority queue
    pub tasks_in_queue: IntGauge,

    /// Terminally processed orders by status (`success`/`failed`) and type
    pub tasks_processed_total: IntCounterVec,

    /// Station execution time distribution
    pub station_processing_duration: HistogramVec,
}

impl SchedulerMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let tasks_in_queue = IntGauge::new(
            "scheduler_tasks_in_queue",
            "The number of tasks currently waiting in the priority queue",
        )?;

        let tasks_processed_total = IntCounterVec::new(
            Opts::new("scheduler_tasks_processed_total", "The total number of processed tasks"),
            &["status", "type"],
        )?;

        let station_processing_duration = HistogramVec::new(
            HistogramOpts::new("station_processing_duration_seconds", "Time spent in each station"),
            &["station_id"],
        )?;

        registry.register(Box::new(tasks_in_queue.clone()))?;
        registry.register(Box::new(tasks_processed_total.clone()))?;
        registry.register(Box::new(station_processing_duration.clone()))?;

        Ok(Self { tasks_in_queue, tasks_processed_total, station_processing_duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_metrics() {
        let registry = Registry::new();
        let metrics = SchedulerMetrics::new(&registry).unwrap();

        metrics.tasks_in_queue.inc();
        metrics.tasks_processed_total.with_label_values(&["success", "PCB_PROTOTYPE"]).inc();
        metrics
            .station_processing_duration
            .with_label_values(&["STATION_CAM"])
            .observe(0.25);

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"scheduler_tasks_in_queue".to_string()));
        assert!(names.contains(&"scheduler_tasks_processed_total".to_string()));
        assert!(names.contains(&"station_processing_duration_seconds".to_string()));
    }

    #[test]
    fn double_registration_is_an_error() {
        let registry = Registry::new();
        let _metrics = SchedulerMetrics::new(&registry).unwrap();
        assert!(SchedulerMetrics::new(&registry).is_err());
    }
}
