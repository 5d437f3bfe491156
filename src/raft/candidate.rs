use super::follower;
use super::log::ReplicatedLog;
use super::messages::{AppendEntriesRequest, RaftMessage, VoteResponse};
use super::outcome::Outcome;
use super::state::{FollowerProgress, ReplicaState, Role};
use crate::util::errors::Result;

/// Candidate handler: pure function of (event, state, log).
pub fn handle(
    message: &RaftMessage,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
) -> Result<Outcome> {
    let mut outcome = Outcome::from_state(state);
    if let Some(term) = message.term() {
        if term > outcome.term {
            outcome.step_down(term);
        }
    }

    match message {
        RaftMessage::VoteRequest(request) => {
            follower::receive_vote_request(&mut outcome, state, log, request);
        }
        RaftMessage::VoteResponse(response) => {
            receive_vote_response(&mut outcome, state, log, response);
        }
        RaftMessage::AppendEntriesRequest(request) => {
            // A live leader at our term revokes the candidacy.
            if request.leader_term == outcome.term {
                outcome.role = Role::Follower;
            }
            follower::receive_append_request(&mut outcome, state, log, request);
        }
        RaftMessage::Heartbeat(heartbeat) => {
            if heartbeat.leader_term == outcome.term {
                outcome.role = Role::Follower;
            }
            follower::receive_heartbeat(&mut outcome, state, log, heartbeat);
        }
        RaftMessage::LogCompactionInfo(info) => {
            if info.leader_term == outcome.term {
                outcome.role = Role::Follower;
            }
            follower::receive_compaction_info(&mut outcome, log, info);
        }
        RaftMessage::ElectionTimeout => {
            // Split vote or lost messages; try again in a fresh term.
            follower::start_election(&mut outcome, state, log);
        }
        RaftMessage::NewEntry(_) | RaftMessage::NewEntryBatch(_) => {
            tracing::debug!(
                "Replica {} dropped client entry, election in progress",
                state.id
            );
        }
        RaftMessage::AppendEntriesResponse(_) | RaftMessage::HeartbeatTimeout => {}
    }

    Ok(outcome)
}

fn receive_vote_response(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    response: &VoteResponse,
) {
    if outcome.role != Role::Candidate {
        // A higher term in the response already demoted us.
        return;
    }
    if response.term < outcome.term || !response.vote_granted {
        return;
    }

    outcome.votes_received.insert(response.from);
    tracing::debug!(
        "Replica {} has {}/{} votes in term {}",
        state.id,
        outcome.votes_received.len(),
        state.cluster_size(),
        outcome.term
    );

    if !state.is_majority(outcome.votes_received.len()) {
        return;
    }

    tracing::info!(
        "Replica {} won election for term {} with {} votes",
        state.id,
        outcome.term,
        outcome.votes_received.len()
    );

    outcome.role = Role::Leader;
    outcome.leader = Some(state.id);
    outcome.votes_received.clear();
    outcome.progress.clear();

    // Assume every follower is caught up until proven otherwise, and probe
    // with an empty append so the consistency check runs immediately.
    let append_index = log.append_index();
    for member in &state.members {
        outcome
            .progress
            .insert(*member, FollowerProgress::new(append_index + 1));
        outcome.send(
            *member,
            RaftMessage::AppendEntriesRequest(AppendEntriesRequest::new(
                state.id,
                outcome.term,
                append_index,
                log.last_term(),
                vec![],
                state.commit_index,
            )),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::log::InMemoryLog;
    use crate::raft::types::{LogEntry, ReplicaId};

    fn candidate_state(id: u128, term: i64, peers: &[u128]) -> ReplicaState {
        let mut state = ReplicaState::new(ReplicaId(id));
        state.current_term = term;
        state.role = Role::Candidate;
        state.voted_for = Some(ReplicaId(id));
        state.votes_received.insert(ReplicaId(id));
        for p in peers {
            state.members.insert(ReplicaId(*p));
        }
        state
    }

    #[test]
    fn majority_vote_promotes_to_leader_with_empty_append_probe() {
        let state = candidate_state(1, 5, &[2, 3]);
        let log = InMemoryLog::new();

        let response = VoteResponse {
            from: ReplicaId(2),
            term: 5,
            vote_granted: true,
        };
        let outcome = handle(&RaftMessage::VoteResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Leader);
        assert_eq!(outcome.leader, Some(ReplicaId(1)));
        assert_eq!(outcome.outbound.len(), 2);
        for directed in &outcome.outbound {
            match &directed.message {
                RaftMessage::AppendEntriesRequest(request) => {
                    assert_eq!(request.leader_term, 5);
                    assert!(request.entries.is_empty());
                    assert_eq!(request.prev_log_index, -1);
                    assert_eq!(request.prev_log_term, -1);
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
        for progress in outcome.progress.values() {
            assert_eq!(progress.next_index, 0);
            assert_eq!(progress.match_index, -1);
        }
    }

    #[test]
    fn minority_vote_keeps_counting() {
        let state = candidate_state(1, 5, &[2, 3, 4, 5]);
        let log = InMemoryLog::new();

        let response = VoteResponse {
            from: ReplicaId(2),
            term: 5,
            vote_granted: true,
        };
        let outcome = handle(&RaftMessage::VoteResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Candidate);
        assert_eq!(outcome.votes_received.len(), 2);
        assert!(outcome.outbound.is_empty());
    }

    #[test]
    fn higher_term_response_demotes_to_follower() {
        let state = candidate_state(1, 5, &[2, 3]);
        let log = InMemoryLog::new();

        let response = VoteResponse {
            from: ReplicaId(2),
            term: 7,
            vote_granted: false,
        };
        let outcome = handle(&RaftMessage::VoteResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Follower);
        assert_eq!(outcome.term, 7);
        assert_eq!(outcome.voted_for, None);
    }

    #[test]
    fn same_term_append_revokes_candidacy_and_applies_entries() {
        let state = candidate_state(1, 5, &[2, 3]);
        let log = InMemoryLog::new();

        let request = AppendEntriesRequest::new(
            ReplicaId(2),
            5,
            -1,
            -1,
            vec![LogEntry::new(5, b"a".to_vec())],
            -1,
        );
        let outcome = handle(&RaftMessage::AppendEntriesRequest(request), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Follower);
        assert_eq!(outcome.leader, Some(ReplicaId(2)));
        assert_eq!(outcome.log_commands.len(), 1);
        assert!(outcome.renew_election_timeout);
    }

    #[test]
    fn election_timeout_restarts_election_in_next_term() {
        let state = candidate_state(1, 5, &[2, 3]);
        let log = InMemoryLog::new();

        let outcome = handle(&RaftMessage::ElectionTimeout, &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Candidate);
        assert_eq!(outcome.term, 6);
        assert_eq!(outcome.votes_received.len(), 1);
        assert_eq!(outcome.outbound.len(), 2);
    }

    #[test]
    fn stale_vote_response_is_ignored() {
        let state = candidate_state(1, 5, &[2, 3]);
        let log = InMemoryLog::new();

        let response = VoteResponse {
            from: ReplicaId(2),
            term: 4,
            vote_granted: true,
        };
        let outcome = handle(&RaftMessage::VoteResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Candidate);
        assert_eq!(outcome.votes_received.len(), 1);
    }
}
