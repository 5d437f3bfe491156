pub mod config;

pub use config::{ClusterConfig, Config, ReplicaConfig};
