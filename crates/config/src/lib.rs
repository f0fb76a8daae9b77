//! Configuration schema and loader for replikv nodes.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's listen address.
    pub listen: SocketAddr,

    /// Every node of the cluster as an `http://host:port` base URL,
    /// this node included. The local entry is recognised by port.
    #[serde(default)]
    pub topology: Vec<String>,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Replication settings.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the embedded database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Per replica call timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on concurrently executing fan-out commands,
    /// shared by all in-flight requests.
    #[serde(default = "default_fan_out_permits")]
    pub fan_out_permits: usize,

    /// Drain period granted to in-flight batches on shutdown before
    /// they are force-cancelled.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            fan_out_permits: default_fan_out_permits(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

// --- Defaults ---

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_request_timeout_ms() -> u64 {
    1000
}
fn default_fan_out_permits() -> usize {
    16
}
fn default_shutdown_grace_ms() -> u64 {
    5000
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for addr in &self.topology {
            let port = addr
                .trim_end_matches('/')
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok());
            if port.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "topology entry has no port: {}",
                    addr
                )));
            }
        }
        if self.replication.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "replication.request_timeout_ms must be > 0".into(),
            ));
        }
        if self.replication.fan_out_permits == 0 {
            return Err(ConfigError::Invalid(
                "replication.fan_out_permits must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
