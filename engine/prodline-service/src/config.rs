//! Service configuration management
//!
//! Configuration is read from a TOML file (`prodline.toml` by default,
//! `PRODLINE_CONFIG` overrides the path), every section has working
//! defaults, and a handful of `PRODLINE_*` environment variables override
//! the file for container deployments.

use anyhow::{Context, Result};
use prodline_types::{
    WorkflowStep, STATION_AOI, STATION_CAM, STATION_DRILL, STATION_E_TEST, STATION_ETCH,
    STATION_LAMI, STATION_MASK, STATION_PACK, STATION_SILK,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service-level settings
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Station behavior
    pub stations: StationSettings,

    /// Per-station concurrency caps
    pub resource_pools: HashMap<String, usize>,

    /// Workflow definitions keyed by order type
    pub workflows: HashMap<String, Vec<WorkflowStep>>,
}

/// Service-level settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Production-line parallel capacity (concurrent orders in flight)
    pub max_workers: usize,

    /// Delay between successive workflow steps in milliseconds
    pub step_delay_ms: u64,

    /// Simulated station processing time in milliseconds
    pub station_delay_ms: u64,

    /// Write-ahead log location
    pub wal_path: PathBuf,

    /// Gateway listen address
    pub gateway_addr: String,

    /// Seed a batch of demo orders on startup (never inferred from the
    /// WAL; recovery and seeding are independent)
    pub seed_demo_orders: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_workers: 3,
            step_delay_ms: 500,
            station_delay_ms: 10_000,
            wal_path: PathBuf::from("data/tasks.wal"),
            gateway_addr: "127.0.0.1:8080".to_string(),
            seed_demo_orders: false,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Station behavior settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Synthetic defect probability of the flying-probe e-test
    pub etest_failure_rate: f32,

    /// Base URL of the remote AOI station service
    pub aoi_endpoint: String,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self { etest_failure_rate: 0.05, aoi_endpoint: "http://127.0.0.1:9090".to_string() }
    }
}

impl ServiceConfig {
    /// Parsed gateway listen address.
    pub fn gateway_addr(&self) -> Result<SocketAddr> {
        self.service
            .gateway_addr
            .parse()
            .with_context(|| format!("invalid gateway address '{}'", self.service.gateway_addr))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.service.max_workers == 0 {
            anyhow::bail!("service.max_workers must be greater than 0");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("invalid log level: {other}"),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        if !(0.0..=1.0).contains(&self.stations.etest_failure_rate) {
            anyhow::bail!("stations.etest_failure_rate must be within [0, 1]");
        }

        if self.workflows.is_empty() {
            anyhow::bail!("at least one workflow must be configured");
        }

        let has_default = self
            .workflows
            .keys()
            .any(|key| key.eq_ignore_ascii_case(orchestrator::workflow::DEFAULT_WORKFLOW));
        if !has_default {
            anyhow::bail!(
                "the default workflow '{}' must be configured",
                orchestrator::workflow::DEFAULT_WORKFLOW
            );
        }

        self.gateway_addr()?;
        Ok(())
    }
}

/// The built-in PCB line: double-layer (the default), multi-layer with a
/// rule-gated lamination step, and a short prototype run. The mask/silk
/// step runs its two stations in parallel.
pub fn default_workflows() -> HashMap<String, Vec<WorkflowStep>> {
    let double_layer = vec![
        WorkflowStep::new(&[STATION_CAM]),
        WorkflowStep::new(&[STATION_DRILL]),
        WorkflowStep::new(&[STATION_ETCH]),
        WorkflowStep::new(&[STATION_MASK, STATION_SILK]),
        WorkflowStep::new(&[STATION_AOI]),
        WorkflowStep::new(&[STATION_E_TEST]),
        WorkflowStep::new(&[STATION_PACK]),
    ];

    let multilayer = vec![
        WorkflowStep::new(&[STATION_CAM]),
        WorkflowStep::new(&[STATION_DRILL]),
        WorkflowStep::new(&[STATION_LAMI]).with_rule("product.attrs.layers >= 4"),
        WorkflowStep::new(&[STATION_ETCH]),
        WorkflowStep::new(&[STATION_MASK, STATION_SILK]),
        WorkflowStep::new(&[STATION_AOI]),
        WorkflowStep::new(&[STATION_E_TEST]),
        WorkflowStep::new(&[STATION_PACK]),
    ];

    let prototype = vec![
        WorkflowStep::new(&[STATION_CAM]),
        WorkflowStep::new(&[STATION_DRILL]),
        WorkflowStep::new(&[STATION_ETCH]),
        WorkflowStep::new(&[STATION_PACK]),
    ];

    HashMap::from([
        ("pcb_double_layer".to_string(), double_layer),
        ("pcb_multilayer".to_string(), multilayer),
        ("pcb_prototype".to_string(), prototype),
    ])
}

/// Default resource pools: the flying probe is the line's bottleneck.
pub fn default_resource_pools() -> HashMap<String, usize> {
    HashMap::from([(STATION_E_TEST.to_string(), 1), (STATION_DRILL.to_string(), 2)])
}

/// Load configuration from file and environment variables
pub fn load_config() -> Result<ServiceConfig> {
    let path = std::env::var("PRODLINE_CONFIG").unwrap_or_else(|_| "prodline.toml".to_string());
    let mut config = if Path::new(&path).exists() {
        load_from_file(Path::new(&path))?
    } else {
        ServiceConfig::default()
    };

    if config.workflows.is_empty() {
        config.workflows = default_workflows();
    }
    if config.resource_pools.is_empty() {
        config.resource_pools = default_resource_pools();
    }

    load_from_env(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file
fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file at {path:?}"))?;
    let config: ServiceConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML config from {path:?}"))?;
    Ok(config)
}

/// Override selected settings from environment variables
fn load_from_env(config: &mut ServiceConfig) -> Result<()> {
    if let Ok(level) = std::env::var("PRODLINE_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Ok(format) = std::env::var("PRODLINE_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Ok(max_workers) = std::env::var("PRODLINE_MAX_WORKERS") {
        config.service.max_workers =
            max_workers.parse().context("PRODLINE_MAX_WORKERS must be an integer")?;
    }

    if let Ok(wal_path) = std::env::var("PRODLINE_WAL_PATH") {
        config.service.wal_path = PathBuf::from(wal_path);
    }

    if let Ok(addr) = std::env::var("PRODLINE_GATEWAY_ADDR") {
        config.service.gateway_addr = addr;
    }

    if let Ok(seed) = std::env::var("PRODLINE_SEED_DEMO_ORDERS") {
        config.service.seed_demo_orders = seed.parse().unwrap_or(false);
    }

    if let Ok(endpoint) = std::env::var("PRODLINE_AOI_ENDPOINT") {
        config.stations.aoi_endpoint = endpoint;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.workflows = default_workflows();
        config.resource_pools = default_resource_pools();
        config
    }

    #[test]
    fn defaults_validate() {
        base_config().validate().unwrap();
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = base_config();
        config.service.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_default_workflow() {
        let mut config = base_config();
        config.workflows.remove("pcb_double_layer");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = base_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_workflows_from_toml() {
        let toml = r#"
            [service]
            max_workers = 2
            step_delay_ms = 10
            station_delay_ms = 5

            [resource_pools]
            STATION_E_TEST = 1

            [[workflows.pcb_double_layer]]
            station_ids = ["STATION_CAM"]

            [[workflows.pcb_double_layer]]
            station_ids = ["STATION_MASK", "STATION_SILK"]

            [[workflows.pcb_multilayer]]
            station_ids = ["STATION_LAMI"]
            rule = "product.attrs.layers >= 4"
        "#;

        let config: ServiceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.service.max_workers, 2);
        assert_eq!(config.workflows["pcb_double_layer"].len(), 2);
        assert_eq!(config.workflows["pcb_double_layer"][1].station_ids.len(), 2);
        assert_eq!(
            config.workflows["pcb_multilayer"][0].rule.as_deref(),
            Some("product.attrs.layers >= 4")
        );
        config.validate().unwrap();
    }

    #[test]
    fn multilayer_workflow_gates_lamination() {
        let workflows = default_workflows();
        let lamination = workflows["pcb_multilayer"]
            .iter()
            .find(|step| step.station_ids == vec![STATION_LAMI.to_string()])
            .unwrap();
        assert_eq!(lamination.rule.as_deref(), Some("product.attrs.layers >= 4"));
    }
}
