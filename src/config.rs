//! Configuration management for AgriChain

use crate::error::{ChainError, Result};
use crate::miner::DEFAULT_DIFFICULTY;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Highest difficulty a SHA-256 hex digest can express.
pub const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(
        default = "default_peer_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub peer_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bind_address: default_bind_address(),
            bootstrap_peers: Vec::new(),
            peer_timeout: default_peer_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(
        default = "default_mining_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub auto_mine: bool,
    #[serde(
        default = "default_auto_mine_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub auto_mine_interval: Duration,
    /// Reward recipient; a random id is generated when unset
    #[serde(default)]
    pub node_id: Option<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            timeout: default_mining_timeout(),
            auto_mine: false,
            auto_mine_interval: default_auto_mine_interval(),
            node_id: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DIFFICULTY).contains(&self.miner.difficulty) {
            return Err(ChainError::Config(format!(
                "miner.difficulty must be between 1 and {}, got {}",
                MAX_DIFFICULTY, self.miner.difficulty
            )));
        }
        if self.miner.timeout.is_zero() {
            return Err(ChainError::Config("miner.timeout must be non-zero".into()));
        }
        if self.miner.auto_mine && self.miner.auto_mine_interval.is_zero() {
            return Err(ChainError::Config(
                "miner.auto_mine_interval must be non-zero".into(),
            ));
        }
        if self.network.peer_timeout.is_zero() {
            return Err(ChainError::Config(
                "network.peer_timeout must be non-zero".into(),
            ));
        }
        if self.network.bind_address.trim().is_empty() {
            return Err(ChainError::Config("network.bind_address must be set".into()));
        }
        Ok(())
    }
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file found; using defaults");
        return Ok(Config::default());
    }
    let source = fs::read_to_string(path)?;
    Config::from_toml_str(&source)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn default_api_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_peer_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_mining_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_auto_mine_interval() -> Duration {
    Duration::from_secs(10)
}
