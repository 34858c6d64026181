//! # Stations
//!
//! A station is one processing stage of the line. The engine treats every
//! station uniformly through the [`Station`] trait: `execute` does the work
//! (and may fail), `compensate` undoes it best-effort during Saga rollback.
//!
//! Two implementations ship here: [`LocalStation`] simulates time-delayed
//! work in-process, [`RemoteStation`] drives an HTTP station service.

pub mod error;
pub mod local;
pub mod remote;

use async_trait::async_trait;
use prodline_types::{Order, TaskContext};

pub use error::{Result, StationError};
pub use local::LocalStation;
pub use remote::RemoteStation;

/// Uniform contract for a processing stage.
///
/// Stations are registered once at startup and shared across all orders;
/// they hold no per-order state. Implementations must honour cancellation
/// in `execute` where they can. `compensate` is best-effort and must run
/// to completion even when the context is cancelled.
#[async_trait]
pub trait Station: Send + Sync {
    /// Stable station id, used for registration, pools and metrics.
    fn id(&self) -> &str;

    /// Label recorded in the order history on success.
    fn history_label(&self) -> String {
        self.id().to_string()
    }

    /// Perform this stage's work for one order.
    async fn execute(&self, ctx: &TaskContext, order: &Order) -> Result<()>;

    /// Undo previously completed work. Failures are logged, never raised.
    async fn compensate(&self, ctx: &TaskContext, order: &Order);
}
