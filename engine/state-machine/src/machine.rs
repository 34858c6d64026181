//! The order state machine

use crate::error::{FsmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle states of a production order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductState {
    Created,
    Processing,
    QualityCheck,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl ProductState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductState::Created => "CREATED",
            ProductState::Processing => "PROCESSING",
            ProductState::QualityCheck => "QUALITY_CHECK",
            ProductState::Completed => "COMPLETED",
            ProductState::Failed => "FAILED",
            ProductState::Compensating => "COMPENSATING",
            ProductState::Compensated => "COMPENSATED",
        }
    }

    /// Completed and Compensated are terminal; no event leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProductState::Completed | ProductState::Compensated)
    }
}

impl std::fmt::Display for ProductState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductEvent {
    Start,
    EnterQc,
    PassQc,
    Finish,
    Fail,
    Compensate,
    RollbackDone,
}

impl ProductEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductEvent::Start => "START",
            ProductEvent::EnterQc => "ENTER_QC",
            ProductEvent::PassQc => "PASS_QC",
            ProductEvent::Finish => "FINISH",
            ProductEvent::Fail => "FAIL",
            ProductEvent::Compensate => "COMPENSATE",
            ProductEvent::RollbackDone => "ROLLBACK_DONE",
        }
    }
}

impl std::fmt::Display for ProductEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed transition table.
fn next_state(from: ProductState, event: ProductEvent) -> Option<ProductState> {
    use ProductEvent::*;
    use ProductState::*;

    match (from, event) {
        (Created, Start) => Some(Processing),
        (Processing, EnterQc) => Some(QualityCheck),
        (Processing, Finish) => Some(Completed),
        (Processing, Fail) => Some(Failed),
        (QualityCheck, PassQc) => Some(Processing),
        (QualityCheck, Finish) => Some(Completed),
        (QualityCheck, Fail) => Some(Failed),
        (Failed, Compensate) => Some(Compensating),
        (Compensating, RollbackDone) => Some(Compensated),
        _ => None,
    }
}

type StateCallback = Box<dyn Fn(&str) + Send + Sync>;

struct FsmInner {
    current: ProductState,
    callbacks: HashMap<ProductState, StateCallback>,
}

/// State machine bound to a single order.
///
/// `fire` is serialized by an internal mutex. Registered callbacks run
/// synchronously inside that lock, so they must not call back into `fire`
/// on the same instance.
pub struct ProductFsm {
    target_id: String,
    inner: Mutex<FsmInner>,
}

impl ProductFsm {
    /// Create a machine in the `Created` state for the given order id.
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            inner: Mutex::new(FsmInner {
                current: ProductState::Created,
                callbacks: HashMap::new(),
            }),
        }
    }

    /// Id of the order this machine is bound to.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn current(&self) -> ProductState {
        self.inner.lock().unwrap().current
    }

    /// Register a callback invoked whenever the given state is entered.
    pub fn on_enter(&self, state: ProductState, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.lock().unwrap().callbacks.insert(state, Box::new(callback));
    }

    /// Fire an event, transitioning to the next state if the table allows
    /// it. Returns the new state, or an error (state unchanged) when the
    /// transition is illegal.
    pub fn fire(&self, event: ProductEvent) -> Result<ProductState> {
        let mut inner = self.inner.lock().unwrap();

        let next = next_state(inner.current, event)
            .ok_or(FsmError::InvalidTransition { from: inner.current, event })?;

        tracing::debug!(target_id = %self.target_id, from = %inner.current, to = %next, %event, "state transition");
        inner.current = next;

        if let Some(callback) = inner.callbacks.get(&next) {
            callback(&self.target_id);
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn starts_in_created() {
        let fsm = ProductFsm::new("PCB-1");
        assert_eq!(fsm.current(), ProductState::Created);
        assert!(!fsm.current().is_terminal());
    }

    #[test]
    fn happy_path_to_completed() {
        let fsm = ProductFsm::new("PCB-1");
        assert_eq!(fsm.fire(ProductEvent::Start).unwrap(), ProductState::Processing);
        assert_eq!(fsm.fire(ProductEvent::Finish).unwrap(), ProductState::Completed);
        assert!(fsm.current().is_terminal());
    }

    #[test]
    fn quality_check_loop() {
        let fsm = ProductFsm::new("PCB-1");
        fsm.fire(ProductEvent::Start).unwrap();
        assert_eq!(fsm.fire(ProductEvent::EnterQc).unwrap(), ProductState::QualityCheck);
        assert_eq!(fsm.fire(ProductEvent::PassQc).unwrap(), ProductState::Processing);
        assert_eq!(fsm.fire(ProductEvent::EnterQc).unwrap(), ProductState::QualityCheck);
        assert_eq!(fsm.fire(ProductEvent::Finish).unwrap(), ProductState::Completed);
    }

    #[test]
    fn failure_and_compensation() {
        let fsm = ProductFsm::new("PCB-1");
        fsm.fire(ProductEvent::Start).unwrap();
        assert_eq!(fsm.fire(ProductEvent::Fail).unwrap(), ProductState::Failed);
        assert_eq!(fsm.fire(ProductEvent::Compensate).unwrap(), ProductState::Compensating);
        assert_eq!(fsm.fire(ProductEvent::RollbackDone).unwrap(), ProductState::Compensated);
        assert!(fsm.current().is_terminal());
    }

    #[test]
    fn illegal_transition_is_rejected_without_mutation() {
        let fsm = ProductFsm::new("PCB-1");
        let err = fsm.fire(ProductEvent::Finish).unwrap_err();
        assert_eq!(
            err,
            FsmError::InvalidTransition {
                from: ProductState::Created,
                event: ProductEvent::Finish
            }
        );
        assert_eq!(fsm.current(), ProductState::Created);
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let fsm = ProductFsm::new("PCB-1");
        fsm.fire(ProductEvent::Start).unwrap();
        fsm.fire(ProductEvent::Finish).unwrap();
        assert!(fsm.fire(ProductEvent::Start).is_err());
        assert!(fsm.fire(ProductEvent::Fail).is_err());
    }

    #[test]
    fn callbacks_run_on_entry() {
        let fsm = ProductFsm::new("PCB-7");
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(String::new()));

        let hits2 = hits.clone();
        let seen2 = seen.clone();
        fsm.on_enter(ProductState::Processing, move |id| {
            hits2.fetch_add(1, Ordering::SeqCst);
            *seen2.lock().unwrap() = id.to_string();
        });

        fsm.fire(ProductEvent::Start).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), "PCB-7");
    }
}
