//! Error types for station execution

use thiserror::Error;

/// Result type alias for station operations
pub type Result<T> = std::result::Result<T, StationError>;

/// Ways a station execution can fail
#[derive(Error, Debug)]
pub enum StationError {
    /// The station ran and reported a defect
    #[error("{0}")]
    Failed(String),

    /// Transport-level failure talking to a remote station
    #[error("remote call failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote station answered with a non-200 status
    #[error("remote station returned status {0}")]
    Status(u16),

    /// The surrounding workflow was cancelled mid-execution
    #[error("execution cancelled")]
    Cancelled,
}
