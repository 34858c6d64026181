//! In-process simulated station

use crate::error::{Result, StationError};
use crate::Station;
use async_trait::async_trait;
use prodline_types::{Order, TaskContext};
use std::time::Duration;
use tokio::time::sleep;

/// A station simulated in-process with a time delay.
///
/// Work time is the configured delay plus up to 50 % random jitter. A
/// non-zero `failure_rate` makes the station synthesize defects, which is
/// how the flying-probe e-test models real-world yield.
pub struct LocalStation {
    id: String,
    delay: Duration,
    failure_rate: f32,
}

impl LocalStation {
    pub fn new(id: impl Into<String>, delay_ms: u64) -> Self {
        Self { id: id.into(), delay: Duration::from_millis(delay_ms), failure_rate: 0.0 }
    }

    /// Probability in `[0, 1]` that `execute` reports a synthetic defect.
    pub fn with_failure_rate(mut self, failure_rate: f32) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    fn work_time(&self) -> Duration {
        let base = self.delay.as_millis() as u64;
        if base <= 1 {
            return self.delay;
        }
        let jitter = rand::random::<u64>() % (base / 2).max(1);
        Duration::from_millis(base + jitter)
    }
}

#[async_trait]
impl Station for LocalStation {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &TaskContext, order: &Order) -> Result<()> {
        tracing::info!(
            station_id = %self.id,
            product_id = %order.id,
            trace_id = %ctx.trace_id(),
            "processing order"
        );

        let work = self.work_time();
        tokio::select! {
            _ = sleep(work) => {}
            _ = ctx.cancelled() => {
                tracing::warn!(station_id = %self.id, product_id = %order.id, "execution cancelled");
                return Err(StationError::Cancelled);
            }
        }

        if self.failure_rate > 0.0 && rand::random::<f32>() < self.failure_rate {
            tracing::warn!(station_id = %self.id, product_id = %order.id, "defect detected");
            return Err(StationError::Failed(format!("{} detected a defect", self.id)));
        }

        tracing::info!(
            station_id = %self.id,
            product_id = %order.id,
            duration_secs = work.as_secs_f64(),
            "order processed"
        );
        Ok(())
    }

    // Rollback runs regardless of cancellation, so no select here.
    async fn compensate(&self, ctx: &TaskContext, order: &Order) {
        tracing::warn!(
            station_id = %self.id,
            product_id = %order.id,
            trace_id = %ctx.trace_id(),
            "compensating order"
        );
        sleep(self.delay).await;
    }
}
