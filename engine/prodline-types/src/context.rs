//! Task context: trace correlation and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Generate an opaque trace id for correlating one order's run across the
/// scheduler, the engine, station calls and remote services.
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Cooperative cancellation signal shared by the scheduler, its workers and
/// every station call spawned for them.
///
/// Cancellation is one-way and sticky: once `cancel` is called every clone
/// observes it, both by polling `is_cancelled` and by awaiting `cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering so a cancel between the first check
            // and `notified()` is not lost.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-worker execution context handed down into station calls.
#[derive(Debug, Clone)]
pub struct TaskContext {
    trace_id: String,
    cancel: CancelToken,
}

impl TaskContext {
    /// Context for one order's run, sharing the scheduler's cancel signal.
    pub fn new(trace_id: impl Into<String>, cancel: CancelToken) -> Self {
        Self { trace_id: trace_id.into(), cancel }
    }

    /// Root context with a fresh trace id and its own cancellation domain.
    pub fn root() -> Self {
        Self::new(new_trace_id(), CancelToken::new())
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(new_trace_id(), new_trace_id());
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!token.is_cancelled());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled()).await.unwrap();
    }
}
