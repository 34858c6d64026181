//! Service state: component construction, wiring and lifecycle

use crate::config::ServiceConfig;
use crate::handlers::register_event_handlers;
use anyhow::{Context, Result};
use event_bus::EventBus;
use orchestrator::{Scheduler, SchedulerMetrics, StateTracker, WorkflowEngine};
use persistence::Wal;
use plant_gateway::GatewayServer;
use prodline_types::{
    CancelToken, Order, STATION_AOI, STATION_CAM, STATION_DRILL, STATION_E_TEST, STATION_ETCH,
    STATION_LAMI, STATION_MASK, STATION_PACK, STATION_SILK,
};
use prometheus::Registry;
use station::{LocalStation, RemoteStation};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns every long-lived component of the service.
pub struct ServiceState {
    pub config: ServiceConfig,
    pub registry: Arc<Registry>,
    pub bus: Arc<EventBus>,
    pub tracker: Arc<StateTracker>,
    pub wal: Arc<Wal>,
    pub scheduler: Arc<Scheduler>,
    shutdown: CancelToken,
}

impl ServiceState {
    /// Build and wire every component. Failing here (WAL, metrics) must
    /// abort startup; the caller turns the error into a non-zero exit.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = SchedulerMetrics::new(&registry).context("failed to register metrics")?;

        let wal = Arc::new(
            Wal::open(&config.service.wal_path).with_context(|| {
                format!("failed to open WAL at {:?}", config.service.wal_path)
            })?,
        );

        let bus = Arc::new(EventBus::new());
        let tracker = Arc::new(StateTracker::new());
        register_event_handlers(&bus, tracker.clone(), metrics.clone());

        let engine = Arc::new(build_engine(&config, bus.clone())?);

        let scheduler = Arc::new(Scheduler::new(
            engine,
            config.service.max_workers,
            wal.clone(),
            tracker.clone(),
            metrics,
        ));

        Ok(Self {
            config,
            registry,
            bus,
            tracker,
            wal,
            scheduler,
            shutdown: CancelToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> &CancelToken {
        &self.shutdown
    }

    /// Replay the WAL and requeue unfinished orders.
    pub async fn recover(&self) -> Result<usize> {
        let recovered = self.scheduler.recover().await.context("WAL recovery failed")?;
        if recovered > 0 {
            info!(count = recovered, "recovered unfinished orders from WAL");
        }
        Ok(recovered)
    }

    /// Spawn the scheduler dispatch loop.
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    /// Spawn the HTTP/WebSocket gateway.
    pub fn start_gateway(&self) -> Result<JoinHandle<()>> {
        let addr = self.config.gateway_addr()?;
        let gateway = Arc::new(GatewayServer::new(
            self.scheduler.clone(),
            self.tracker.clone(),
            self.registry.clone(),
        ));
        let shutdown = self.shutdown.clone();
        Ok(tokio::spawn(async move { gateway.run(addr, shutdown).await }))
    }

    /// Inject a small batch of demo orders, staggered the way a shift
    /// would see them: routine work first, then an urgent multi-layer
    /// order that must overtake the queue.
    pub async fn seed_demo_orders(&self) -> Result<()> {
        info!("seeding demo orders");

        self.scheduler
            .submit(Order::new("Normal_01", "PCB_DOUBLE_LAYER", 0).with_attr("layers", 2i64))
            .await?;
        self.scheduler.submit(Order::new("Proto_01", "PCB_PROTOTYPE", 0)).await?;

        tokio::time::sleep(Duration::from_millis(200)).await;

        self.scheduler
            .submit(
                Order::new("URGENT_MULTILAYER_01", "PCB_MULTILAYER", 2)
                    .with_attr("layers", 6i64),
            )
            .await?;
        self.scheduler
            .submit(Order::new("RUSH_ORDER_01", "PCB_DOUBLE_LAYER", 1).with_attr("layers", 2i64))
            .await?;

        Ok(())
    }
}

/// Build the workflow engine and register the full station line.
fn build_engine(config: &ServiceConfig, bus: Arc<EventBus>) -> Result<WorkflowEngine> {
    let mut engine = WorkflowEngine::new(
        config.workflows.clone(),
        config.resource_pools.clone(),
        bus,
        Duration::from_millis(config.service.step_delay_ms),
    );

    let delay = config.service.station_delay_ms;
    for id in [
        STATION_CAM,
        STATION_DRILL,
        STATION_LAMI,
        STATION_ETCH,
        STATION_MASK,
        STATION_SILK,
        STATION_PACK,
    ] {
        engine.register_station(Arc::new(LocalStation::new(id, delay)));
    }

    engine.register_station(Arc::new(
        LocalStation::new(STATION_E_TEST, delay)
            .with_failure_rate(config.stations.etest_failure_rate),
    ));

    engine.register_station(Arc::new(
        RemoteStation::new(STATION_AOI, config.stations.aoi_endpoint.clone())
            .context("failed to build remote AOI station client")?,
    ));

    Ok(engine)
}
