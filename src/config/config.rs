use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::errors::{RaftError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Minimum election timeout in milliseconds (e.g., 150)
    pub election_timeout_min_ms: u64,

    /// Maximum election timeout in milliseconds (e.g., 300)
    pub election_timeout_max_ms: u64,

    /// Heartbeat interval in milliseconds (e.g., 50)
    /// Should be much less than election timeout
    pub heartbeat_interval_ms: u64,

    /// Directory for persistent storage
    pub data_dir: PathBuf,
}

impl ReplicaConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err("election_timeout_min must be less than election_timeout_max".to_string());
        }

        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err("heartbeat_interval must be less than election_timeout_min".to_string());
        }

        Ok(())
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of replicas a local demo cluster spins up.
    pub replica_count: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { replica_count: 3 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub replica: ReplicaConfig,
    pub cluster: ClusterConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| RaftError::InvalidConfig(format!("malformed config file: {}", e)))?;
        config.replica.validate().map_err(RaftError::InvalidConfig)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ReplicaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(50));
    }

    #[test]
    fn rejects_inverted_election_window() {
        let config = ReplicaConfig {
            election_timeout_min_ms: 300,
            election_timeout_max_ms: 150,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_heartbeat_slower_than_elections() {
        let config = ReplicaConfig {
            heartbeat_interval_ms: 200,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_json_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let written = Config::default();
        fs::write(&path, serde_json::to_string_pretty(&written).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(
            loaded.replica.election_timeout_min_ms,
            written.replica.election_timeout_min_ms
        );
        assert_eq!(loaded.cluster.replica_count, 3);
    }
}
