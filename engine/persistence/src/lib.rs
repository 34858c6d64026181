//! # Persistence layer
//!
//! A write-ahead log makes order admission durable: every accepted order is
//! written (and fsynced) before it is enqueued, and terminal completion is
//! recorded the same way. On startup [`Wal::recover`] replays the log and
//! returns the orders that were admitted but never completed.

pub mod error;
pub mod wal;

pub use error::{PersistenceError, Result};
pub use wal::{Wal, WalRecord};
