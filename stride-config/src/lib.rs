//! Layered configuration loading utilities.

use std::path::{Path, PathBuf};

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use stride_validate::ValidatorConfig;

/// Root application configuration deserialized from layered sources.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    /// Prometheus exporter address; the exporter stays off when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    /// JSON log file; stdout-only logging when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoardConfig {
    /// Number of ranked players served in snapshots.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

/// Synthetic ghost-rider traffic for demos and load shakeouts.
#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sim_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_sim_ghosts")]
    pub ghosts: usize,
    #[serde(default = "default_min_nudge_meters")]
    pub min_nudge_meters: u32,
    #[serde(default = "default_max_nudge_meters")]
    pub max_nudge_meters: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            ws_addr: default_ws_addr(),
            metrics_addr: None,
            log_file: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_sim_interval_ms(),
            ghosts: default_sim_ghosts(),
            min_nudge_meters: default_min_nudge_meters(),
            max_nudge_meters: default_max_nudge_meters(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_ws_addr() -> String {
    "127.0.0.1:8081".into()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/stride.db")
}

fn default_top_n() -> usize {
    10
}

fn default_bus_capacity() -> usize {
    2048
}

fn default_sim_interval_ms() -> u64 {
    5000
}

fn default_sim_ghosts() -> usize {
    11
}

fn default_min_nudge_meters() -> u32 {
    50
}

fn default_max_nudge_meters() -> u32 {
    300
}

/// Loads configuration by merging files and environment variables.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `STRIDE_`
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    let base_path = Path::new("config");

    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(true));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("STRIDE")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder.build()?;
    config
        .try_deserialize()
        .map_err(|err: ConfigError| err.into())
}
