//! Core domain types for the production line

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CAM engineering station (line entry): file processing and pre-check
pub const STATION_CAM: &str = "STATION_CAM";
/// CNC drilling machine
pub const STATION_DRILL: &str = "STATION_DRILL";
/// Lamination press (multi-layer boards only)
pub const STATION_LAMI: &str = "STATION_LAMI";
/// Etching line: forms the circuit pattern
pub const STATION_ETCH: &str = "STATION_ETCH";
/// Solder-mask coater
pub const STATION_MASK: &str = "STATION_MASK";
/// Silkscreen printer
pub const STATION_SILK: &str = "STATION_SILK";
/// AOI optical inspection (remote station)
pub const STATION_AOI: &str = "STATION_AOI";
/// Flying-probe electrical test (resource bottleneck)
pub const STATION_E_TEST: &str = "STATION_E_TEST";
/// Packaging machine (line exit)
pub const STATION_PACK: &str = "STATION_PACK";

/// A dynamic order attribute.
///
/// Step rules compare these at runtime, so the type is deliberately closed:
/// booleans, integers, floats and strings, nothing nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// Human-readable type name, used in rule-evaluation errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

/// One position in a workflow.
///
/// Multiple station ids mean those stations run concurrently and the step
/// succeeds only if all of them succeed. An empty rule means the step always
/// executes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub station_ids: Vec<String>,

    /// Rule expression gating this step (e.g. `product.attrs.layers >= 4`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl WorkflowStep {
    pub fn new(station_ids: &[&str]) -> Self {
        Self { station_ids: station_ids.iter().map(|s| s.to_string()).collect(), rule: None }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

/// A production order routed through the line.
///
/// Exactly one worker owns an order while it is in flight; everything else
/// sees read-only event payloads or state-tracker views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order id
    pub id: String,

    /// Order type, naming the workflow to run
    #[serde(rename = "type")]
    pub order_type: String,

    /// Priority: larger values dispatch earlier
    #[serde(default)]
    pub priority: i32,

    /// Index of the step currently executing
    #[serde(default)]
    pub step: usize,

    /// Labels of stations that completed successfully, in completion order
    #[serde(default)]
    pub history: Vec<String>,

    /// Dynamic attributes consumed by step rules
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, AttrValue>,
}

impl Order {
    pub fn new(id: impl Into<String>, order_type: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            order_type: order_type.into(),
            priority,
            step: 0,
            history: Vec::new(),
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}
