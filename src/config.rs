//! Configuration management for TraceChain

use crate::error::{ChainError, Result};
use crate::miner::{validate_difficulty, DEFAULT_DIFFICULTY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";
pub const NODE_ID_ENV: &str = "NODE_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `ledger_<node_id>.db`.
    #[serde(default = "default_data_dir")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Directory holding `wallet_<node_id>.json`.
    #[serde(default = "default_data_dir")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_node_id() -> String {
    "3000".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Expands a leading `~/` to the home directory.
fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.node.node_id.trim().is_empty() {
            return Err(ChainError::InvalidConfig("node.node_id must be set".to_string()));
        }
        if self.database.path.trim().is_empty() {
            return Err(ChainError::InvalidConfig("database.path must be set".to_string()));
        }
        if self.wallet.path.trim().is_empty() {
            return Err(ChainError::InvalidConfig("wallet.path must be set".to_string()));
        }
        validate_difficulty(self.miner.difficulty)?;
        self.log_level()?;
        Ok(())
    }

    /// Replaces the node id when `node_id` holds a non-empty value.
    pub fn with_node_id_override(mut self, node_id: Option<String>) -> Self {
        if let Some(id) = node_id.filter(|id| !id.trim().is_empty()) {
            self.node.node_id = id.trim().to_string();
        }
        self
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.level.parse().map_err(|_| {
            ChainError::InvalidConfig(format!("Unknown log level '{}'", self.logging.level))
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        expand_path(&self.database.path).join(format!("ledger_{}.db", self.node.node_id))
    }

    pub fn wallet_path(&self) -> PathBuf {
        expand_path(&self.wallet.path).join(format!("wallet_{}.json", self.node.node_id))
    }
}

/// Reads `config.toml` from the working directory, or defaults when it is absent.
pub fn load_config() -> Result<Config> {
    load_config_from(CONFIG_FILE)
}

pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)
            .map_err(|e| ChainError::InvalidConfig(format!("{}: {}", path.display(), e)))?
    } else {
        Config::default()
    };

    let config = config.with_node_id_override(std::env::var(NODE_ID_ENV).ok());
    config.validate()?;
    Ok(config)
}
