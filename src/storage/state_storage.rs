use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::raft::types::{ReplicaId, Term};
use crate::util::errors::{RaftError, Result};

/// Durable per-replica state that must survive restart for safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableState {
    pub current_term: Term,
    pub voted_for: Option<ReplicaId>,
}

impl Default for DurableState {
    fn default() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
        }
    }
}

/// Trait for persisting term and vote.
pub trait StateStore: Send {
    fn save_term(&mut self, term: Term) -> Result<()>;
    fn save_vote(&mut self, vote: Option<ReplicaId>) -> Result<()>;
    fn load(&self) -> Result<DurableState>;
}

/// File-backed state store.
///
/// Fixed big-endian format: the current term as 8 bytes, then the vote as a
/// presence byte (0 = no vote, 1 = vote follows) and, when present, the two
/// 64-bit halves of the voted-for replica id.
pub struct FileStateStore {
    data_dir: PathBuf,
    state: DurableState,
}

impl FileStateStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;

        let mut store = Self {
            data_dir,
            state: DurableState::default(),
        };
        store.state = store.load_from_disk()?;
        Ok(store)
    }

    fn state_file_path(&self) -> PathBuf {
        self.data_dir.join("replica_state.bin")
    }

    fn load_from_disk(&self) -> Result<DurableState> {
        let state_path = self.state_file_path();
        if !state_path.exists() {
            return Ok(DurableState::default());
        }

        let mut file = File::open(&state_path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            return Ok(DurableState::default());
        }

        let state = decode_state(&buffer)?;
        tracing::info!(
            "Loaded durable state: term={}, voted_for={:?}",
            state.current_term,
            state.voted_for
        );
        Ok(state)
    }

    fn save_to_disk(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.state_file_path())?;

        file.write_all(&encode_state(&self.state))?;
        file.sync_all()?;
        Ok(())
    }
}

fn encode_state(state: &DurableState) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(8 + 1 + 16);
    buffer.extend_from_slice(&state.current_term.to_be_bytes());
    match state.voted_for {
        None => buffer.push(0),
        Some(id) => {
            buffer.push(1);
            let (high, low) = id.halves();
            buffer.extend_from_slice(&high.to_be_bytes());
            buffer.extend_from_slice(&low.to_be_bytes());
        }
    }
    buffer
}

fn decode_state(buffer: &[u8]) -> Result<DurableState> {
    if buffer.len() < 9 {
        return Err(RaftError::SerializationError(
            "state file shorter than term and presence byte".to_string(),
        ));
    }
    let current_term = i64::from_be_bytes(buffer[0..8].try_into().unwrap());
    let voted_for = match buffer[8] {
        0 => None,
        1 => {
            if buffer.len() < 25 {
                return Err(RaftError::SerializationError(
                    "state file truncated inside vote record".to_string(),
                ));
            }
            let high = u64::from_be_bytes(buffer[9..17].try_into().unwrap());
            let low = u64::from_be_bytes(buffer[17..25].try_into().unwrap());
            Some(ReplicaId::from_halves(high, low))
        }
        marker => {
            return Err(RaftError::SerializationError(format!(
                "unknown vote presence marker {}",
                marker
            )))
        }
    };
    Ok(DurableState {
        current_term,
        voted_for,
    })
}

impl StateStore for FileStateStore {
    fn save_term(&mut self, term: Term) -> Result<()> {
        self.state.current_term = term;
        self.save_to_disk()
    }

    fn save_vote(&mut self, vote: Option<ReplicaId>) -> Result<()> {
        self.state.voted_for = vote;
        self.save_to_disk()
    }

    fn load(&self) -> Result<DurableState> {
        Ok(self.state.clone())
    }
}
