//! # Orchestrator
//!
//! The core of the production line: the priority queue, the workflow engine
//! (step sequencing, parallel fan-out, resource pools, Saga rollback), the
//! scheduler (durable admission, priority dispatch, bounded workers,
//! recovery, graceful shutdown) and the state tracker that mirrors every
//! order for the UI.
//!
//! The scheduler depends on the [`Processor`] capability and the engine on
//! a [`StateObserver`], so the concrete types can be wired together at
//! startup without cyclic ownership.

pub mod error;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod state_tracker;
pub mod workflow;

use async_trait::async_trait;
use prodline_types::{Order, TaskContext};

pub use error::{Result, SchedulerError};
pub use metrics::SchedulerMetrics;
pub use queue::PriorityQueue;
pub use scheduler::Scheduler;
pub use state_tracker::{GlobalState, ProductView, StateTracker, STATUS_QUEUED};
pub use workflow::WorkflowEngine;

/// Capability the scheduler needs from the workflow engine: drive one order
/// to a terminal state. The outcome is reported through events, not the
/// return value.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, ctx: &TaskContext, order: &mut Order);
}

/// Capability for pushing order state to whoever renders it.
pub trait StateObserver: Send + Sync {
    /// A new order was admitted (status `QUEUED`, no station yet).
    fn add_product(&self, order: &Order);

    /// An existing order moved; unknown ids are ignored.
    fn update_product_state(&self, id: &str, station: &str, status: &str);
}
