//! # Plant gateway
//!
//! The HTTP/WebSocket surface of the orchestrator:
//!
//! - `POST /api/tasks`: admit an order (202 on success)
//! - `GET /api/state`: full state-tracker snapshot
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /ws`: live snapshot push on every state change
//!
//! The gateway owns no state of its own; it forwards to the scheduler and
//! the state tracker it is constructed with.

pub mod server;

pub use server::GatewayServer;
