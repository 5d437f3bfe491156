use rand::Rng;
use serde::{Deserialize, Serialize};

/// Logical election epoch. At most one leader per term.
pub type Term = i64;

/// Position in the replicated log. Logs are 0-indexed; -1 means "before the
/// first entry" / "log is empty".
pub type LogIndex = i64;

/// Opaque 128-bit identity of a consensus participant. Compared by value,
/// never recycled within a cluster's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(pub u128);

impl ReplicaId {
    pub fn random() -> Self {
        ReplicaId(rand::thread_rng().gen())
    }

    /// Reassemble an id from the two 64-bit halves used by the durable format.
    pub fn from_halves(high: u64, low: u64) -> Self {
        ReplicaId(((high as u128) << 64) | low as u128)
    }

    /// The two 64-bit halves (high, low) used by the durable format.
    pub fn halves(&self) -> (u64, u64) {
        ((self.0 >> 64) as u64, self.0 as u64)
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A single entry in the replicated log. Immutable once appended; replaced
/// only through explicit truncate-then-append on conflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Term in which the entry was created.
    pub term: Term,
    /// Opaque replicated payload.
    pub content: Vec<u8>,
}

impl LogEntry {
    pub fn new(term: Term, content: Vec<u8>) -> Self {
        Self { term, content }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_id_halves_round_trip() {
        let id = ReplicaId(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210);
        let (high, low) = id.halves();
        assert_eq!(high, 0x0123_4567_89ab_cdef);
        assert_eq!(low, 0xfedc_ba98_7654_3210);
        assert_eq!(ReplicaId::from_halves(high, low), id);
    }

    #[test]
    fn log_entry_equality_is_structural() {
        assert_eq!(LogEntry::new(2, vec![1, 2]), LogEntry::new(2, vec![1, 2]));
        assert_ne!(LogEntry::new(2, vec![1, 2]), LogEntry::new(3, vec![1, 2]));
        assert_ne!(LogEntry::new(2, vec![1, 2]), LogEntry::new(2, vec![1]));
    }
}
