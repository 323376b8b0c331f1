use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub suppliers: SupplierConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_release_reason")]
    pub release_reason: String,
    #[serde(default = "default_refund_reason")]
    pub refund_reason: String,
    #[serde(default = "default_true")]
    pub auto_close_expired_rfqs: bool,
}

fn default_release_reason() -> String {
    "Order completed successfully".to_string()
}

fn default_refund_reason() -> String {
    "Order cancelled or issue resolved".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            release_reason: default_release_reason(),
            refund_reason: default_refund_reason(),
            auto_close_expired_rfqs: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SupplierConfig {
    /// supplier id -> rating
    #[serde(default)]
    pub ratings: HashMap<String, f64>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. SEPTRA__STORE__DATA_DIR=/var/lib/septra
            .add_source(config::Environment::with_prefix("SEPTRA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
