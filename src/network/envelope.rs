use serde::{Deserialize, Serialize};

use crate::raft::messages::RaftMessage;
use crate::util::errors::{RaftError, Result};

/// Upper bound on a framed message, prefix excluded.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Identity of the replicated store a cluster serves. Messages from a
/// different store are silently discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u128);

impl StoreId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Everything that crosses replica boundaries travels wrapped in an envelope
/// binding the message to one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEnvelope {
    pub store_id: StoreId,
    pub message: RaftMessage,
}

impl ClusterEnvelope {
    pub fn new(store_id: StoreId, message: RaftMessage) -> Self {
        Self { store_id, message }
    }

    /// Unwrap the message for a replica serving `store_id`.
    pub fn open(self, store_id: &StoreId) -> Result<RaftMessage> {
        if self.store_id != *store_id {
            return Err(RaftError::WrongStore);
        }
        Ok(self.message)
    }
}

/// Frame an envelope: 4-byte big-endian length prefix, then the payload.
pub fn encode(envelope: &ClusterEnvelope) -> Result<Vec<u8>> {
    let payload = bincode::serialize(envelope)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(RaftError::SerializationError(format!(
            "message of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decode one complete frame. The buffer must hold exactly the prefix and
/// payload.
pub fn decode(framed: &[u8]) -> Result<ClusterEnvelope> {
    if framed.len() < 4 {
        return Err(RaftError::SerializationError(
            "frame shorter than its length prefix".to_string(),
        ));
    }
    let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
    if len == 0 {
        return Err(RaftError::SerializationError(
            "zero-length frame".to_string(),
        ));
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(RaftError::SerializationError(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_MESSAGE_SIZE
        )));
    }
    if framed.len() - 4 != len {
        return Err(RaftError::SerializationError(format!(
            "frame length prefix says {} bytes but {} are present",
            len,
            framed.len() - 4
        )));
    }

    Ok(bincode::deserialize(&framed[4..])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::messages::{Heartbeat, RaftMessage};
    use crate::raft::types::ReplicaId;

    fn heartbeat_envelope(store_id: StoreId) -> ClusterEnvelope {
        ClusterEnvelope::new(
            store_id,
            RaftMessage::Heartbeat(Heartbeat {
                from: ReplicaId(7),
                leader_term: 3,
                commit_index: 12,
                commit_index_term: 3,
            }),
        )
    }

    #[test]
    fn frames_carry_a_big_endian_length_prefix() {
        let envelope = heartbeat_envelope(StoreId(1));
        let framed = encode(&envelope).unwrap();

        let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, framed.len() - 4);
        assert_eq!(decode(&framed).unwrap(), envelope);
    }

    #[test]
    fn envelope_filters_by_store() {
        let mine = StoreId::random();
        let theirs = StoreId::random();

        assert!(matches!(
            heartbeat_envelope(mine).open(&theirs),
            Err(RaftError::WrongStore)
        ));
        assert!(heartbeat_envelope(mine).open(&mine).is_ok());
    }

    #[test]
    fn rejects_malformed_frames() {
        let envelope = heartbeat_envelope(StoreId(1));
        let framed = encode(&envelope).unwrap();

        assert!(decode(&framed[..3]).is_err());
        assert!(decode(&framed[..framed.len() - 1]).is_err());
        assert!(decode(&[0, 0, 0, 0]).is_err());
    }
}
