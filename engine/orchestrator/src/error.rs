//! Error types for scheduling

use thiserror::Error;

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors surfaced by the scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The WAL rejected the admission record; the order was not enqueued.
    #[error("admission failed: {0}")]
    Wal(#[from] persistence::PersistenceError),
}
