//! Order admission, durable logging, priority dispatch and worker pooling

use crate::error::Result;
use crate::metrics::SchedulerMetrics;
use crate::queue::PriorityQueue;
use crate::{Processor, StateObserver};
use persistence::Wal;
use prodline_types::{new_trace_id, CancelToken, Order, TaskContext};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Admits orders durably, dispatches them in priority order to a bounded
/// worker pool, and recovers unfinished orders from the WAL on startup.
///
/// At most `max_workers` orders are processed concurrently; the rest wait
/// in the priority queue. The dispatch loop parks on a [`Notify`] while the
/// queue is empty and re-checks both emptiness and cancellation on wake.
pub struct Scheduler {
    queue: Mutex<PriorityQueue>,
    notify: Notify,
    worker_slots: Arc<Semaphore>,
    engine: Arc<dyn Processor>,
    wal: Arc<Wal>,
    observer: Arc<dyn StateObserver>,
    metrics: SchedulerMetrics,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<dyn Processor>,
        max_workers: usize,
        wal: Arc<Wal>,
        observer: Arc<dyn StateObserver>,
        metrics: SchedulerMetrics,
    ) -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            notify: Notify::new(),
            worker_slots: Arc::new(Semaphore::new(max_workers)),
            engine,
            wal,
            observer,
            metrics,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Admit a new order.
    ///
    /// The WAL append happens first and is authoritative: if it fails the
    /// order is rejected and nothing is enqueued.
    pub async fn submit(&self, order: Order) -> Result<()> {
        self.wal.append(&order).await?;

        tracing::info!(
            product_id = %order.id,
            product_type = %order.order_type,
            priority = order.priority,
            "order admitted"
        );

        self.observer.add_product(&order);
        self.queue.lock().unwrap().push(order);
        self.metrics.tasks_in_queue.inc();
        self.notify.notify_one();
        Ok(())
    }

    /// Re-enqueue every order the WAL says was admitted but never
    /// completed. Recovery does not append: the orders are already
    /// journaled. Returns how many orders were recovered.
    pub async fn recover(&self) -> Result<usize> {
        let orders = self.wal.recover().await?;
        let count = orders.len();

        for order in orders {
            tracing::info!(product_id = %order.id, "recovered unfinished order");
            self.observer.add_product(&order);
            self.queue.lock().unwrap().push(order);
            self.metrics.tasks_in_queue.inc();
        }

        if count > 0 {
            self.notify.notify_one();
        }
        Ok(count)
    }

    /// Run the dispatch loop until `shutdown` is cancelled.
    ///
    /// Workers already running keep going after cancellation; join them
    /// with [`Scheduler::wait_for_completion`].
    pub async fn run(&self, shutdown: CancelToken) {
        loop {
            if shutdown.is_cancelled() {
                tracing::info!("scheduler shutting down");
                return;
            }

            let popped = self.queue.lock().unwrap().pop();
            let order = match popped {
                Some(order) => order,
                None => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = shutdown.cancelled() => {}
                    }
                    continue;
                }
            };

            self.metrics.tasks_in_queue.dec();

            // Blocks while all worker slots are busy. Running workers
            // always release their slot, so this cannot deadlock.
            let permit = match self.worker_slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("worker pool closed, stopping dispatch");
                    return;
                }
            };

            self.spawn_worker(order, permit, shutdown.clone());
        }
    }

    fn spawn_worker(
        &self,
        mut order: Order,
        permit: tokio::sync::OwnedSemaphorePermit,
        shutdown: CancelToken,
    ) {
        let engine = self.engine.clone();
        let wal = self.wal.clone();

        let trace_id = new_trace_id();
        let span = tracing::info_span!("worker", product_id = %order.id, trace_id = %trace_id);

        let handle = tokio::spawn(
            async move {
                let ctx = TaskContext::new(trace_id, shutdown);
                engine.process(&ctx, &mut order).await;

                // A failed completion record is not fatal: recovery will
                // re-surface the order and processing is idempotent.
                if let Err(error) = wal.complete(&order.id).await {
                    tracing::error!(product_id = %order.id, %error, "failed to journal completion");
                }

                drop(permit);
            }
            .instrument(span),
        );

        let mut workers = self.workers.lock().unwrap();
        workers.retain(|worker| !worker.is_finished());
        workers.push(handle);
    }

    /// Join every worker spawned so far.
    pub async fn wait_for_completion(&self) {
        loop {
            let handle = self.workers.lock().unwrap().pop();
            match handle {
                Some(handle) => {
                    if let Err(error) = handle.await {
                        tracing::error!(%error, "worker task panicked");
                    }
                }
                None => return,
            }
        }
    }

    /// Number of orders currently queued (test and introspection hook).
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prometheus::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    struct RecordingProcessor {
        processed: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        delay: Duration,
    }

    impl RecordingProcessor {
        fn new(delay: Duration) -> Self {
            Self {
                processed: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                delay,
            }
        }

        fn processed(&self) -> Vec<String> {
            self.processed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Processor for RecordingProcessor {
        async fn process(&self, _ctx: &TaskContext, order: &mut Order) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            sleep(self.delay).await;
            self.processed.lock().unwrap().push(order.id.clone());
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct NullObserver;

    impl StateObserver for NullObserver {
        fn add_product(&self, _order: &Order) {}
        fn update_product_state(&self, _id: &str, _station: &str, _status: &str) {}
    }

    struct Fixture {
        scheduler: Arc<Scheduler>,
        processor: Arc<RecordingProcessor>,
        wal: Arc<Wal>,
        _dir: TempDir,
    }

    fn fixture(max_workers: usize, delay: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let wal = Arc::new(Wal::open(dir.path().join("tasks.wal")).unwrap());
        let processor = Arc::new(RecordingProcessor::new(delay));
        let metrics = SchedulerMetrics::new(&Registry::new()).unwrap();
        let scheduler = Arc::new(Scheduler::new(
            processor.clone(),
            max_workers,
            wal.clone(),
            Arc::new(NullObserver),
            metrics,
        ));
        Fixture { scheduler, processor, wal, _dir: dir }
    }

    async fn drain(scheduler: &Arc<Scheduler>, shutdown: &CancelToken, expected: usize, processor: &RecordingProcessor) {
        for _ in 0..200 {
            if processor.processed().len() >= expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        scheduler.wait_for_completion().await;
    }

    #[tokio::test]
    async fn dispatches_by_priority_with_single_worker() {
        let Fixture { scheduler, processor, _dir, .. } = fixture(1, Duration::from_millis(10));

        scheduler.submit(Order::new("normal-1", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
        scheduler.submit(Order::new("normal-2", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
        scheduler.submit(Order::new("urgent", "PCB_DOUBLE_LAYER", 2)).await.unwrap();

        let shutdown = CancelToken::new();
        let loop_handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        drain(&scheduler, &shutdown, 3, &processor).await;
        loop_handle.await.unwrap();

        assert_eq!(processor.processed(), vec!["urgent", "normal-1", "normal-2"]);
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let Fixture { scheduler, processor, _dir, .. } = fixture(2, Duration::from_millis(30));

        for i in 0..6 {
            scheduler.submit(Order::new(format!("O{i}"), "PCB_DOUBLE_LAYER", 0)).await.unwrap();
        }

        let shutdown = CancelToken::new();
        let loop_handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        drain(&scheduler, &shutdown, 6, &processor).await;
        loop_handle.await.unwrap();

        assert_eq!(processor.processed().len(), 6);
        assert!(processor.max_running.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_queue_blocks_until_cancellation() {
        let Fixture { scheduler, _dir, .. } = fixture(1, Duration::from_millis(1));

        let shutdown = CancelToken::new();
        let loop_handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        sleep(Duration::from_millis(30)).await;
        assert!(!loop_handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), loop_handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn recovery_requeues_unfinished_orders_without_relogging() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("tasks.wal");

        // First life: two orders admitted, one completed.
        {
            let wal = Wal::open(&wal_path).unwrap();
            wal.append(&Order::new("done", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
            wal.append(&Order::new("pending", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
            wal.complete("done").await.unwrap();
        }

        // Second life: recovery picks up only the pending order.
        let wal = Arc::new(Wal::open(&wal_path).unwrap());
        let processor = Arc::new(RecordingProcessor::new(Duration::from_millis(1)));
        let metrics = SchedulerMetrics::new(&Registry::new()).unwrap();
        let scheduler = Arc::new(Scheduler::new(
            processor.clone(),
            1,
            wal.clone(),
            Arc::new(NullObserver),
            metrics,
        ));

        assert_eq!(scheduler.recover().await.unwrap(), 1);

        let shutdown = CancelToken::new();
        let loop_handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };
        drain(&scheduler, &shutdown, 1, &processor).await;
        loop_handle.await.unwrap();

        assert_eq!(processor.processed(), vec!["pending"]);

        // Recovery did not re-append, and completion was journaled, so a
        // third replay finds nothing outstanding.
        assert!(wal.recover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_gauge_moves_on_push_and_pop() {
        let registry = Registry::new();
        let dir = TempDir::new().unwrap();
        let wal = Arc::new(Wal::open(dir.path().join("tasks.wal")).unwrap());
        let processor = Arc::new(RecordingProcessor::new(Duration::from_millis(1)));
        let metrics = SchedulerMetrics::new(&registry).unwrap();
        let scheduler = Arc::new(Scheduler::new(
            processor.clone(),
            1,
            wal,
            Arc::new(NullObserver),
            metrics.clone(),
        ));

        scheduler.submit(Order::new("A", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
        scheduler.submit(Order::new("B", "PCB_DOUBLE_LAYER", 0)).await.unwrap();
        assert_eq!(metrics.tasks_in_queue.get(), 2);

        let shutdown = CancelToken::new();
        let loop_handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };
        drain(&scheduler, &shutdown, 2, &processor).await;
        loop_handle.await.unwrap();

        assert_eq!(metrics.tasks_in_queue.get(), 0);
    }
}
