//! # Prodline service
//!
//! Wires the engine together into the production binary: configuration,
//! logging, signal handling, event-handler registration, recovery and
//! graceful shutdown. The heavy lifting lives in the engine crates; this
//! crate owns startup order and teardown.

pub mod config;
pub mod handlers;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::{load_config, ServiceConfig};
pub use handlers::register_event_handlers;
pub use logging::initialize_logging;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};
