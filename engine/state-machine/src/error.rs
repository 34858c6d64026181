//! Error types for the state machine

use crate::machine::{ProductEvent, ProductState};
use thiserror::Error;

/// Result type alias for state-machine operations
pub type Result<T> = std::result::Result<T, FsmError>;

/// Errors that can occur when driving an order's state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// The (current state, event) pair has no entry in the transition table
    #[error("invalid transition: cannot fire event '{event}' from state '{from}'")]
    InvalidTransition { from: ProductState, event: ProductEvent },
}
