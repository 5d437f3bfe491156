use std::collections::{HashMap, HashSet};

use super::messages::{Directed, RaftMessage};
use super::state::{FollowerProgress, ReplicaState, Role};
use super::types::{LogEntry, LogIndex, ReplicaId, Term};

/// Instruction for the driver loop to run against the log, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCommand {
    /// Append `entries` starting at `from_index` (the current tail + 1).
    Append {
        from_index: LogIndex,
        entries: Vec<LogEntry>,
    },
    /// Discard entries from `from_index` to the tail.
    Truncate { from_index: LogIndex },
    /// Raise the commit index to `to`.
    AdvanceCommit { to: LogIndex },
}

/// The accumulated, side-effect-free result of processing one event.
///
/// Seeded with the current state, adjusted by the role handler, applied
/// exactly once by the driver loop, then discarded.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub role: Role,
    pub term: Term,
    pub voted_for: Option<ReplicaId>,
    pub leader: Option<ReplicaId>,
    pub votes_received: HashSet<ReplicaId>,
    pub progress: HashMap<ReplicaId, FollowerProgress>,
    pub log_commands: Vec<LogCommand>,
    pub outbound: Vec<Directed>,
    /// The handler saw legitimate leader activity or granted a vote; the
    /// driver must re-randomize and restart the election timer.
    pub renew_election_timeout: bool,
    /// The leader has compacted past what this replica holds; it must fetch a
    /// state transfer out of band before replication can continue.
    pub needs_state_transfer: bool,
}

impl Outcome {
    pub fn from_state(state: &ReplicaState) -> Self {
        Self {
            role: state.role,
            term: state.current_term,
            voted_for: state.voted_for,
            leader: state.leader,
            votes_received: state.votes_received.clone(),
            progress: state.progress.clone(),
            log_commands: Vec::new(),
            outbound: Vec::new(),
            renew_election_timeout: false,
            needs_state_transfer: false,
        }
    }

    /// Adopt a newer term: clear the vote, forget the election tally, demote
    /// to follower. Shared first step of every handler.
    pub fn step_down(&mut self, term: Term) {
        self.term = term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.votes_received.clear();
    }

    pub fn send(&mut self, to: ReplicaId, message: RaftMessage) {
        self.outbound.push(Directed::new(to, message));
    }

    pub fn append(&mut self, from_index: LogIndex, entries: Vec<LogEntry>) {
        self.log_commands.push(LogCommand::Append {
            from_index,
            entries,
        });
    }

    pub fn truncate(&mut self, from_index: LogIndex) {
        self.log_commands.push(LogCommand::Truncate { from_index });
    }

    pub fn advance_commit(&mut self, to: LogIndex) {
        self.log_commands.push(LogCommand::AdvanceCommit { to });
    }

    /// The commit index this outcome advances to, if any.
    pub fn commit_index(&self) -> Option<LogIndex> {
        self.log_commands
            .iter()
            .filter_map(|c| match c {
                LogCommand::AdvanceCommit { to } => Some(*to),
                _ => None,
            })
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_down_clears_vote_and_tally() {
        let mut state = ReplicaState::new(ReplicaId(0));
        state.current_term = 3;
        state.voted_for = Some(ReplicaId(0));
        state.role = Role::Candidate;
        state.votes_received.insert(ReplicaId(0));

        let mut outcome = Outcome::from_state(&state);
        outcome.step_down(5);

        assert_eq!(outcome.term, 5);
        assert_eq!(outcome.voted_for, None);
        assert_eq!(outcome.role, Role::Follower);
        assert!(outcome.votes_received.is_empty());
    }

    #[test]
    fn commit_index_reads_the_highest_advance() {
        let state = ReplicaState::new(ReplicaId(0));
        let mut outcome = Outcome::from_state(&state);
        assert_eq!(outcome.commit_index(), None);
        outcome.advance_commit(2);
        outcome.advance_commit(4);
        assert_eq!(outcome.commit_index(), Some(4));
    }
}
