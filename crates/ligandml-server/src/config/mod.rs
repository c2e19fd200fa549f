//! Configuration loading for ligandml.
//! Reads ligandml.toml from the current directory or the path in LIGANDML_CONFIG,
//! then applies the deployment environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ligandml_broker::RetryPolicy;
use ligandml_model::{DEFAULT_INPUT_DIM, DEFAULT_LEARNING_RATE};
use ligandml_worker::{WorkerConfig, DEFAULT_LEDGER_CAPACITY};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_kind")]
    pub kind: BrokerKind,
    #[serde(default = "default_servers")]
    pub servers: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_broker_kind()      -> BrokerKind { BrokerKind::Memory }
fn default_servers()          -> String { "localhost:9092".to_string() }
fn default_group_id()         -> String { "ligandml-ml-server".to_string() }
fn default_connect_attempts() -> u32 { 30 }
fn default_backoff_secs()     -> u64 { 5 }
fn default_poll_timeout_ms()  -> u64 { 1000 }

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: default_broker_kind(),
            servers: default_servers(),
            group_id: default_group_id(),
            connect_attempts: default_connect_attempts(),
            backoff_secs: default_backoff_secs(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, Duration::from_secs(self.backoff_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,
    #[serde(default = "default_input_dim")]
    pub input_dim: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// 0 disables the weight cache
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_create_base")]
    pub create_base_if_missing: bool,
}

fn default_weights_path()  -> PathBuf { PathBuf::from("./weights/") }
fn default_input_dim()     -> usize { DEFAULT_INPUT_DIM }
fn default_learning_rate() -> f64 { DEFAULT_LEARNING_RATE }
fn default_cache_size()    -> usize { 32 }
fn default_create_base()   -> bool { true }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            input_dim: default_input_dim(),
            learning_rate: default_learning_rate(),
            cache_size: default_cache_size(),
            create_base_if_missing: default_create_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Experiment records kept before the oldest are evicted.
    #[serde(default = "default_experiment_capacity")]
    pub experiment_capacity: usize,
}

fn default_bind()                -> String { "0.0.0.0:5000".to_string() }
fn default_experiment_capacity() -> usize { DEFAULT_LEDGER_CAPACITY }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), experiment_capacity: default_experiment_capacity() }
    }
}

impl Config {
    /// Load configuration from ligandml.toml.
    /// Checks LIGANDML_CONFIG env var first, then current directory.
    /// A missing file falls back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("LIGANDML_CONFIG")
            .unwrap_or_else(|_| "ligandml.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else {
            tracing::warn!("Config file not found: {path}, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay KAFKA_SERVER, KAFKA_GROUP_ID, MODEL_WEIGHTS_PATH and LIGANDML_BIND.
    /// Setting KAFKA_SERVER also selects the Kafka backend.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(servers) = lookup("KAFKA_SERVER") {
            self.broker.servers = servers;
            self.broker.kind = BrokerKind::Kafka;
        }
        if let Some(group_id) = lookup("KAFKA_GROUP_ID") {
            self.broker.group_id = group_id;
        }
        if let Some(path) = lookup("MODEL_WEIGHTS_PATH") {
            self.model.weights_path = PathBuf::from(path);
        }
        if let Some(bind) = lookup("LIGANDML_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            learning_rate: self.model.learning_rate,
            poll_timeout: Duration::from_millis(self.broker.poll_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests;
