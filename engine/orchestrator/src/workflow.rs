//! Workflow engine: drives a single order through its station sequence

use crate::Processor;
use async_trait::async_trait;
use event_bus::{EventBus, EventKind, ProductEvent};
use prodline_types::{Order, TaskContext, WorkflowStep};
use rule_engine::RuleSet;
use state_machine::{ProductEvent as FsmEvent, ProductFsm};
use station::{Station, StationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

/// Workflow used when an order's type has no registered sequence.
pub const DEFAULT_WORKFLOW: &str = "pcb_double_layer";

struct StationOutcome {
    station: Option<Arc<dyn Station>>,
    result: Result<(), StationError>,
}

/// Sequences one order through its workflow, fans parallel steps out over
/// the step's stations, enforces per-station resource pools, and runs the
/// Saga compensation protocol when a step fails.
pub struct WorkflowEngine {
    stations: HashMap<String, Arc<dyn Station>>,
    workflows: HashMap<String, Vec<WorkflowStep>>,
    default_workflow: String,
    pools: HashMap<String, Arc<Semaphore>>,
    rules: RuleSet,
    bus: Arc<EventBus>,
    step_delay: Duration,
}

impl WorkflowEngine {
    /// Workflow keys are folded to lower case so lookups tolerate whatever
    /// case the config loader hands us.
    pub fn new(
        workflows: HashMap<String, Vec<WorkflowStep>>,
        pools: HashMap<String, usize>,
        bus: Arc<EventBus>,
        step_delay: Duration,
    ) -> Self {
        let workflows = workflows
            .into_iter()
            .map(|(key, steps)| (key.to_lowercase(), steps))
            .collect();

        let pools = pools
            .into_iter()
            .map(|(id, capacity)| (id, Arc::new(Semaphore::new(capacity))))
            .collect();

        Self {
            stations: HashMap::new(),
            workflows,
            default_workflow: DEFAULT_WORKFLOW.to_string(),
            pools,
            rules: RuleSet::new(),
            bus,
            step_delay,
        }
    }

    /// Override the fallback workflow key.
    pub fn with_default_workflow(mut self, key: impl Into<String>) -> Self {
        self.default_workflow = key.into().to_lowercase();
        self
    }

    /// Register a station. Later registrations with the same id replace
    /// earlier ones.
    pub fn register_station(&mut self, station: Arc<dyn Station>) {
        self.stations.insert(station.id().to_string(), station);
    }

    fn resolve_workflow(&self, order_type: &str) -> Vec<WorkflowStep> {
        let key = order_type.to_lowercase();
        if let Some(steps) = self.workflows.get(&key) {
            return steps.clone();
        }
        tracing::warn!(
            requested_type = %order_type,
            fallback = %self.default_workflow,
            "no workflow for order type, using default"
        );
        self.workflows.get(&self.default_workflow).cloned().unwrap_or_default()
    }

    /// Drive one order to a terminal state, publishing lifecycle events
    /// along the way. The FSM annotates the run; an illegal transition is
    /// logged but never gates flow.
    pub async fn process(&self, ctx: &TaskContext, order: &mut Order) {
        let fsm = ProductFsm::new(&order.id);
        if let Err(error) = fsm.fire(FsmEvent::Start) {
            tracing::warn!(product_id = %order.id, %error, "fsm rejected start");
        }

        self.bus.publish(ProductEvent::new(
            EventKind::ProductStarted,
            &order.id,
            &order.order_type,
        ));
        tracing::info!(
            product_id = %order.id,
            product_type = %order.order_type,
            trace_id = %ctx.trace_id(),
            "starting production"
        );

        let steps = self.resolve_workflow(&order.order_type);
        let mut executed: Vec<Arc<dyn Station>> = Vec::new();
        let mut ran_a_step = false;

        for (index, step) in steps.iter().enumerate() {
            order.step = index;

            if let Some(rule) = step.rule.as_deref() {
                match self.rules.evaluate(rule, order) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(product_id = %order.id, step = index, rule, "rule skipped step");
                        continue;
                    }
                    Err(error) => {
                        tracing::error!(product_id = %order.id, step = index, rule, %error, "rule evaluation failed, skipping step");
                        continue;
                    }
                }
            }

            if ran_a_step {
                sleep(self.step_delay).await;
            }
            ran_a_step = true;

            let outcomes = self.execute_step(ctx, order, step).await;

            if let Some(failure) = outcomes.iter().find_map(|o| o.result.as_ref().err()) {
                let message = failure.to_string();
                if let Err(error) = fsm.fire(FsmEvent::Fail) {
                    tracing::warn!(product_id = %order.id, %error, "fsm rejected fail");
                }
                self.bus.publish(
                    ProductEvent::new(EventKind::ProductFailed, &order.id, &order.order_type)
                        .with_error(message.clone()),
                );
                tracing::error!(product_id = %order.id, step = index, error = %message, "step failed");

                self.rollback(ctx, order, &executed, &fsm).await;
                return;
            }

            for outcome in outcomes {
                if let Some(station) = outcome.station {
                    order.history.push(station.history_label());
                    executed.push(station);
                }
            }
        }

        if let Err(error) = fsm.fire(FsmEvent::Finish) {
            tracing::warn!(product_id = %order.id, %error, "fsm rejected finish");
        }
        self.bus.publish(ProductEvent::new(
            EventKind::ProductCompleted,
            &order.id,
            &order.order_type,
        ));
        tracing::info!(product_id = %order.id, "order rolled off the line");
    }

    /// Run every station of a step concurrently, each behind its resource
    /// pool, and collect the per-station results in step order.
    async fn execute_step(
        &self,
        ctx: &TaskContext,
        order: &Order,
        step: &WorkflowStep,
    ) -> Vec<StationOutcome> {
        let runs = step.station_ids.iter().map(|station_id| {
            let station = self.stations.get(station_id).cloned();
            let pool = self.pools.get(station_id).cloned();
            let station_id = station_id.clone();

            async move {
                let Some(station) = station else {
                    tracing::error!(product_id = %order.id, %station_id, "station not registered");
                    return StationOutcome {
                        station: None,
                        result: Err(StationError::Failed(format!(
                            "station {station_id} not registered"
                        ))),
                    };
                };

                // Permit is held for the whole call and released on every
                // exit path when it drops.
                let _permit = match pool {
                    Some(pool) => {
                        tracing::debug!(product_id = %order.id, %station_id, "waiting for resource");
                        match pool.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                return StationOutcome {
                                    station: Some(station),
                                    result: Err(StationError::Failed(format!(
                                        "resource pool for {station_id} is closed"
                                    ))),
                                }
                            }
                        }
                    }
                    None => None,
                };

                self.bus.publish(
                    ProductEvent::new(EventKind::StepStarted, &order.id, &order.order_type)
                        .with_station(&station_id),
                );

                let started = Instant::now();
                let result = station.execute(ctx, order).await;
                let duration = started.elapsed().as_secs_f64();

                self.bus.publish(
                    ProductEvent::new(EventKind::StepCompleted, &order.id, &order.order_type)
                        .with_station(&station_id)
                        .with_duration(duration),
                );

                StationOutcome { station: Some(station), result }
            }
        });

        futures::future::join_all(runs).await
    }

    /// Saga rollback: compensate previously successful stations in strict
    /// reverse order. Best-effort and unconditional: it runs to completion
    /// even when the context is already cancelled.
    async fn rollback(
        &self,
        ctx: &TaskContext,
        order: &Order,
        executed: &[Arc<dyn Station>],
        fsm: &ProductFsm,
    ) {
        tracing::warn!(product_id = %order.id, stations = executed.len(), "starting saga compensation");
        if let Err(error) = fsm.fire(FsmEvent::Compensate) {
            tracing::warn!(product_id = %order.id, %error, "fsm rejected compensate");
        }

        for station in executed.iter().rev() {
            station.compensate(ctx, order).await;
        }

        if let Err(error) = fsm.fire(FsmEvent::RollbackDone) {
            tracing::warn!(product_id = %order.id, %error, "fsm rejected rollback-done");
        }
        self.bus.publish(ProductEvent::new(
            EventKind::ProductCompensated,
            &order.id,
            &order.order_type,
        ));
        tracing::info!(product_id = %order.id, "compensation finished");
    }
}

#[async_trait]
impl Processor for WorkflowEngine {
    async fn process(&self, ctx: &TaskContext, order: &mut Order) {
        WorkflowEngine::process(self, ctx, order).await
    }
}
