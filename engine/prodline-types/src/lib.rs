//! # Prodline shared types
//!
//! Domain vocabulary shared by every engine crate: production orders,
//! workflow steps, the closed attribute value type used by step rules, and
//! the task context (trace id + cancellation) that flows from the scheduler
//! into every station call.

pub mod context;
pub mod types;

pub use context::{new_trace_id, CancelToken, TaskContext};
pub use types::{
    AttrValue, Order, WorkflowStep, STATION_AOI, STATION_CAM, STATION_DRILL, STATION_E_TEST,
    STATION_ETCH, STATION_LAMI, STATION_MASK, STATION_PACK, STATION_SILK,
};

/// Station ids are plain strings so they can be used directly in config
/// files, log lines and metric labels.
pub type StationId = String;
