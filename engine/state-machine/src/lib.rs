//! # Order lifecycle state machine
//!
//! One `ProductFsm` instance is bound to each order while a worker processes
//! it. The transition table is fixed; firing an event that has no entry for
//! the current state returns an error and leaves the state untouched.

pub mod error;
pub mod machine;

pub use error::{FsmError, Result};
pub use machine::{ProductEvent, ProductFsm, ProductState};
