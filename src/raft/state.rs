use std::collections::{HashMap, HashSet};

use super::types::{LogIndex, ReplicaId, Term};

/// The three roles a replica can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receives replicated entries from the leader.
    Follower,
    /// Requesting votes for leadership.
    Candidate,
    /// Replicates entries and drives the commit index forward.
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "Follower"),
            Role::Candidate => write!(f, "Candidate"),
            Role::Leader => write!(f, "Leader"),
        }
    }
}

/// The leader's view of one follower's log position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerProgress {
    /// Index of the next entry to send to this follower.
    pub next_index: LogIndex,
    /// Highest index confirmed identical on this follower, -1 if none.
    pub match_index: LogIndex,
}

impl FollowerProgress {
    pub fn new(next_index: LogIndex) -> Self {
        Self {
            next_index,
            match_index: -1,
        }
    }
}

/// Per-replica consensus state, mutated only by applying Outcomes in event
/// order.
#[derive(Debug, Clone)]
pub struct ReplicaState {
    /// This replica's identity.
    pub id: ReplicaId,

    // Durable across restarts.
    /// Latest term this replica has seen. Monotonically non-decreasing.
    pub current_term: Term,
    /// Vote granted in `current_term`, meaningless for any other term.
    pub voted_for: Option<ReplicaId>,

    // Volatile.
    /// Current role.
    pub role: Role,
    /// Highest index known committed. Monotonically non-decreasing.
    pub commit_index: LogIndex,
    /// Best guess at the current leader.
    pub leader: Option<ReplicaId>,
    /// Other members of the cluster, excluding this replica.
    pub members: HashSet<ReplicaId>,

    // Candidate bookkeeping.
    /// Replicas that granted their vote in the current election.
    pub votes_received: HashSet<ReplicaId>,

    // Leader bookkeeping, reinitialized on every election win.
    pub progress: HashMap<ReplicaId, FollowerProgress>,
}

impl ReplicaState {
    pub fn new(id: ReplicaId) -> Self {
        Self {
            id,
            current_term: 0,
            voted_for: None,
            role: Role::Follower,
            commit_index: -1,
            leader: None,
            members: HashSet::new(),
            votes_received: HashSet::new(),
            progress: HashMap::new(),
        }
    }

    /// Total voting cluster size, this replica included.
    pub fn cluster_size(&self) -> usize {
        self.members.len() + 1
    }

    /// Whether `count` replicas form a strict majority of the cluster.
    pub fn is_majority(&self, count: usize) -> bool {
        count >= self.cluster_size() / 2 + 1
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn is_candidate(&self) -> bool {
        self.role == Role::Candidate
    }

    pub fn is_follower(&self) -> bool {
        self.role == Role::Follower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_of_three_is_two() {
        let mut state = ReplicaState::new(ReplicaId(0));
        state.members.insert(ReplicaId(1));
        state.members.insert(ReplicaId(2));
        assert!(!state.is_majority(1));
        assert!(state.is_majority(2));
    }

    #[test]
    fn lone_replica_is_its_own_majority() {
        let state = ReplicaState::new(ReplicaId(0));
        assert!(state.is_majority(1));
    }
}
