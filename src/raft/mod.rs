pub mod candidate;
pub mod follower;
pub mod leader;
pub mod log;
pub mod messages;
pub mod outcome;
pub mod state;
pub mod types;

use self::log::ReplicatedLog;
use self::messages::RaftMessage;
use self::outcome::Outcome;
use self::state::{ReplicaState, Role};
use crate::util::errors::Result;

type Handler = fn(&RaftMessage, &ReplicaState, &dyn ReplicatedLog) -> Result<Outcome>;

/// Dispatch table mapping each role to its pure handler.
fn handler_for(role: Role) -> Handler {
    match role {
        Role::Follower => follower::handle,
        Role::Candidate => candidate::handle,
        Role::Leader => leader::handle,
    }
}

/// Compute the effect of one event on a replica: (state, event) -> Outcome.
/// Mutates nothing; the driver loop applies the Outcome exactly once.
pub fn handle(
    message: &RaftMessage,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
) -> Result<Outcome> {
    handler_for(state.role)(message, state, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::log::InMemoryLog;
    use crate::raft::types::ReplicaId;

    #[test]
    fn dispatch_follows_the_current_role() {
        let mut state = ReplicaState::new(ReplicaId(1));
        state.members.insert(ReplicaId(2));
        let log = InMemoryLog::new();

        // A follower reacts to an election timeout by campaigning; a leader
        // ignores it.
        let outcome = handle(&RaftMessage::ElectionTimeout, &state, &log).unwrap();
        assert_eq!(outcome.role, Role::Candidate);

        state.role = Role::Leader;
        let outcome = handle(&RaftMessage::ElectionTimeout, &state, &log).unwrap();
        assert_eq!(outcome.role, Role::Leader);
        assert!(outcome.outbound.is_empty());
    }
}
