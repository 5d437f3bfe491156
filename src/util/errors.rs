use std::io;

use crate::raft::types::ReplicaId;

#[derive(Debug)]
pub enum RaftError {
    NotLeader(Option<ReplicaId>),
    InvalidConfig(String),
    LogInconsistency(String),
    IoError(io::Error),
    SerializationError(String),
    WrongStore,
}

impl std::fmt::Display for RaftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftError::NotLeader(Some(leader)) => {
                write!(f, "Not the leader, try {}", leader)
            }
            RaftError::NotLeader(None) => write!(f, "Not the leader, no leader known"),
            RaftError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            RaftError::LogInconsistency(msg) => write!(f, "Log inconsistency: {}", msg),
            RaftError::IoError(err) => write!(f, "IO error: {}", err),
            RaftError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            RaftError::WrongStore => write!(f, "Message addressed to a different store"),
        }
    }
}

impl std::error::Error for RaftError {}

impl From<io::Error> for RaftError {
    fn from(err: io::Error) -> Self {
        RaftError::IoError(err)
    }
}

impl From<bincode::Error> for RaftError {
    fn from(err: bincode::Error) -> Self {
        RaftError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RaftError>;
