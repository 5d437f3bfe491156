use super::follower;
use super::log::ReplicatedLog;
use super::messages::{
    AppendEntriesRequest, AppendEntriesResponse, Heartbeat, LogCompactionInfo, RaftMessage,
    VoteResponse,
};
use super::outcome::Outcome;
use super::state::{ReplicaState, Role};
use super::types::{LogEntry, LogIndex, ReplicaId};
use crate::util::errors::Result;

/// Leader handler: pure function of (event, state, log).
pub fn handle(
    message: &RaftMessage,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
) -> Result<Outcome> {
    let mut outcome = Outcome::from_state(state);
    if let Some(term) = message.term() {
        if term > outcome.term {
            tracing::info!(
                "Leader {} observed term {}, stepping down",
                state.id,
                term
            );
            outcome.step_down(term);
            outcome.progress.clear();
        }
    }

    match message {
        RaftMessage::VoteRequest(request) => {
            if outcome.role == Role::Follower {
                follower::receive_vote_request(&mut outcome, state, log, request);
            } else {
                // Still leader, so the request is from our term or older.
                outcome.send(
                    request.from,
                    RaftMessage::VoteResponse(VoteResponse {
                        from: state.id,
                        term: outcome.term,
                        vote_granted: false,
                    }),
                );
            }
        }
        RaftMessage::AppendEntriesRequest(request) => {
            if outcome.role == Role::Follower {
                follower::receive_append_request(&mut outcome, state, log, request);
            } else if request.leader_term == outcome.term {
                tracing::error!(
                    "Leader {} received append from {} in its own term {}",
                    state.id,
                    request.from,
                    outcome.term
                );
            } else {
                follower::receive_append_request(&mut outcome, state, log, request);
            }
        }
        RaftMessage::AppendEntriesResponse(response) => {
            receive_append_response(&mut outcome, state, log, response)?;
        }
        RaftMessage::Heartbeat(heartbeat) => {
            if outcome.role == Role::Follower {
                follower::receive_heartbeat(&mut outcome, state, log, heartbeat);
            }
        }
        RaftMessage::NewEntry(request) => {
            append_new_entries(&mut outcome, state, log, vec![request.content.clone()])?;
        }
        RaftMessage::NewEntryBatch(batch) => {
            append_new_entries(&mut outcome, state, log, batch.contents.clone())?;
        }
        RaftMessage::HeartbeatTimeout => {
            send_heartbeats(&mut outcome, state, log);
        }
        RaftMessage::VoteResponse(_)
        | RaftMessage::LogCompactionInfo(_)
        | RaftMessage::ElectionTimeout => {}
    }

    Ok(outcome)
}

/// Append client content at the current term and ship it to every follower
/// along with whatever backlog its next index says it is missing.
fn append_new_entries(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    contents: Vec<Vec<u8>>,
) -> Result<()> {
    if contents.is_empty() {
        return Ok(());
    }

    let first_index = log.append_index() + 1;
    let entries: Vec<LogEntry> = contents
        .into_iter()
        .map(|content| LogEntry::new(outcome.term, content))
        .collect();
    outcome.append(first_index, entries.clone());

    tracing::debug!(
        "Leader {} appending {} entries at index {}",
        state.id,
        entries.len(),
        first_index
    );

    let members: Vec<ReplicaId> = outcome.progress.keys().copied().collect();
    for member in members {
        let next_index = outcome.progress[&member].next_index;
        if next_index <= log.prev_index() {
            send_compaction_info(outcome, state, log, member);
            continue;
        }
        // Backlog from the log plus the entries just commanded to append.
        let mut to_send = log.read_from(next_index)?;
        to_send.extend_from_slice(&entries);
        send_entries(outcome, state, log, member, next_index, to_send);
    }

    Ok(())
}

fn receive_append_response(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    response: &AppendEntriesResponse,
) -> Result<()> {
    if outcome.role != Role::Leader {
        return Ok(());
    }
    if response.term < outcome.term {
        // Stale response from an earlier leadership, informational only.
        return Ok(());
    }
    let Some(mut progress) = outcome.progress.get(&response.from).copied() else {
        tracing::debug!(
            "Leader {} ignored append response from unknown member {}",
            state.id,
            response.from
        );
        return Ok(());
    };

    if response.success {
        progress.match_index = progress.match_index.max(response.match_index);
        progress.next_index = progress.match_index + 1;
        outcome.progress.insert(response.from, progress);

        advance_commit_index(outcome, state, log);

        // Keep feeding the follower until it has caught up to our tail.
        if progress.next_index <= log.append_index() {
            let entries = log.read_from(progress.next_index)?;
            send_entries(outcome, state, log, response.from, progress.next_index, entries);
        }
    } else {
        // The designed repair path: back off next_index, using the
        // follower's reported tail as a hint, and retry from earlier.
        let backed = (progress.next_index - 1)
            .min(response.append_index + 1)
            .max(0);
        progress.next_index = backed;
        outcome.progress.insert(response.from, progress);

        tracing::debug!(
            "Leader {} backing off next index for {} to {}",
            state.id,
            response.from,
            backed
        );

        if backed <= log.prev_index() {
            send_compaction_info(outcome, state, log, response.from);
        } else {
            let entries = log.read_from(backed)?;
            send_entries(outcome, state, log, response.from, backed, entries);
        }
    }

    Ok(())
}

/// Recompute the commit index: highest index replicated on a strict majority
/// whose entry carries the leader's current term. Entries from prior terms
/// commit only transitively, never directly.
fn advance_commit_index(outcome: &mut Outcome, state: &ReplicaState, log: &dyn ReplicatedLog) {
    let mut best = None;
    for index in (state.commit_index + 1)..=log.append_index() {
        let replicas = 1 + outcome
            .progress
            .values()
            .filter(|p| p.match_index >= index)
            .count();
        if state.is_majority(replicas) && log.term_at(index) == Some(outcome.term) {
            best = Some(index);
        }
    }
    if let Some(index) = best {
        tracing::info!("Leader {} advancing commit index to {}", state.id, index);
        outcome.advance_commit(index);
    }
}

fn send_entries(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    to: ReplicaId,
    next_index: LogIndex,
    entries: Vec<LogEntry>,
) {
    let prev_log_index = next_index - 1;
    let prev_log_term = if prev_log_index == -1 {
        -1
    } else {
        log.term_at(prev_log_index).unwrap_or(-1)
    };
    let leader_commit = outcome.commit_index().unwrap_or(state.commit_index);
    outcome.send(
        to,
        RaftMessage::AppendEntriesRequest(AppendEntriesRequest::new(
            state.id,
            outcome.term,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit,
        )),
    );
}

fn send_compaction_info(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    to: ReplicaId,
) {
    outcome.send(
        to,
        RaftMessage::LogCompactionInfo(LogCompactionInfo {
            from: state.id,
            leader_term: outcome.term,
            prev_index: log.prev_index(),
        }),
    );
}

/// Heartbeats maintain leadership and advertise the commit index with its
/// term so followers can verify the claim before honoring it.
fn send_heartbeats(outcome: &mut Outcome, state: &ReplicaState, log: &dyn ReplicatedLog) {
    let commit_index = state.commit_index;
    let commit_index_term = if commit_index >= 0 {
        log.term_at(commit_index).unwrap_or(-1)
    } else {
        -1
    };
    for member in &state.members {
        outcome.send(
            *member,
            RaftMessage::Heartbeat(Heartbeat {
                from: state.id,
                leader_term: outcome.term,
                commit_index,
                commit_index_term,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::log::InMemoryLog;
    use crate::raft::outcome::LogCommand;
    use crate::raft::state::FollowerProgress;
    use crate::raft::messages::NewEntryRequest;

    fn leader_state(id: u128, term: i64, peers: &[u128], next_index: LogIndex) -> ReplicaState {
        let mut state = ReplicaState::new(ReplicaId(id));
        state.current_term = term;
        state.role = Role::Leader;
        state.leader = Some(ReplicaId(id));
        for p in peers {
            state.members.insert(ReplicaId(*p));
            state
                .progress
                .insert(ReplicaId(*p), FollowerProgress::new(next_index));
        }
        state
    }

    fn log_with_terms(terms: &[i64]) -> InMemoryLog {
        let mut log = InMemoryLog::new();
        for (i, term) in terms.iter().enumerate() {
            log.append(LogEntry::new(*term, vec![i as u8])).unwrap();
        }
        log
    }

    #[test]
    fn new_entry_is_appended_and_replicated() {
        let state = leader_state(1, 2, &[2, 3], 0);
        let log = InMemoryLog::new();

        let request = NewEntryRequest {
            content: b"a".to_vec(),
        };
        let outcome = handle(&RaftMessage::NewEntry(request), &state, &log).unwrap();

        assert_eq!(
            outcome.log_commands,
            vec![LogCommand::Append {
                from_index: 0,
                entries: vec![LogEntry::new(2, b"a".to_vec())],
            }]
        );
        assert_eq!(outcome.outbound.len(), 2);
        for directed in &outcome.outbound {
            match &directed.message {
                RaftMessage::AppendEntriesRequest(request) => {
                    assert_eq!(request.prev_log_index, -1);
                    assert_eq!(request.entries.len(), 1);
                    assert_eq!(request.entries[0].term, 2);
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn batch_carries_backlog_for_lagging_follower() {
        let mut state = leader_state(1, 2, &[2], 0);
        // Follower 2 is missing entries 1..; leader log already has two.
        state.progress.insert(ReplicaId(2), FollowerProgress::new(1));
        let log = log_with_terms(&[1, 2]);

        let batch = crate::raft::messages::NewEntryBatch {
            contents: vec![b"x".to_vec(), b"y".to_vec()],
        };
        let outcome = handle(&RaftMessage::NewEntryBatch(batch), &state, &log).unwrap();

        match &outcome.outbound[0].message {
            RaftMessage::AppendEntriesRequest(request) => {
                assert_eq!(request.prev_log_index, 0);
                assert_eq!(request.prev_log_term, 1);
                // One backlog entry plus the two new ones.
                assert_eq!(request.entries.len(), 3);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn majority_match_commits_current_term_entry() {
        let state = leader_state(1, 2, &[2, 3], 1);
        let log = log_with_terms(&[2]);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 2,
            success: true,
            match_index: 0,
            append_index: 0,
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.commit_index(), Some(0));
        assert_eq!(outcome.progress[&ReplicaId(2)].match_index, 0);
        assert_eq!(outcome.progress[&ReplicaId(2)].next_index, 1);
    }

    #[test]
    fn prior_term_entries_are_never_committed_directly() {
        // Leader of term 3 with an uncommitted entry from term 2.
        let state = leader_state(1, 3, &[2, 3], 1);
        let log = log_with_terms(&[2]);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 3,
            success: true,
            match_index: 0,
            append_index: 0,
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.commit_index(), None);
    }

    #[test]
    fn prior_term_entry_commits_transitively_with_current_term_entry() {
        let state = leader_state(1, 3, &[2, 3], 2);
        let log = log_with_terms(&[2, 3]);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 3,
            success: true,
            match_index: 1,
            append_index: 1,
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.commit_index(), Some(1));
    }

    #[test]
    fn failed_response_backs_off_and_retries_earlier() {
        let state = leader_state(1, 2, &[2, 3], 3);
        let log = log_with_terms(&[1, 1, 2]);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 2,
            success: false,
            match_index: -1,
            append_index: 0, // follower only has entry 0
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.progress[&ReplicaId(2)].next_index, 1);
        match &outcome.outbound[0].message {
            RaftMessage::AppendEntriesRequest(request) => {
                assert_eq!(request.prev_log_index, 0);
                assert_eq!(request.entries.len(), 2);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn backoff_below_log_start_sends_compaction_info() {
        let state = leader_state(1, 2, &[2, 3], 3);
        let mut log = log_with_terms(&[1, 1, 2]);
        log.prune(1);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 2,
            success: false,
            match_index: -1,
            append_index: -1,
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        match &outcome.outbound[0].message {
            RaftMessage::LogCompactionInfo(info) => {
                assert_eq!(info.prev_index, 1);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn heartbeat_timeout_advertises_commit_with_its_term() {
        let mut state = leader_state(1, 3, &[2, 3], 2);
        state.commit_index = 1;
        let log = log_with_terms(&[2, 3]);

        let outcome = handle(&RaftMessage::HeartbeatTimeout, &state, &log).unwrap();

        assert_eq!(outcome.outbound.len(), 2);
        assert!(outcome.log_commands.is_empty());
        for directed in &outcome.outbound {
            match &directed.message {
                RaftMessage::Heartbeat(heartbeat) => {
                    assert_eq!(heartbeat.commit_index, 1);
                    assert_eq!(heartbeat.commit_index_term, 3);
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn higher_term_response_steps_leader_down() {
        let state = leader_state(1, 2, &[2, 3], 1);
        let log = log_with_terms(&[2]);

        let response = AppendEntriesResponse {
            from: ReplicaId(2),
            term: 5,
            success: false,
            match_index: -1,
            append_index: -1,
        };
        let outcome =
            handle(&RaftMessage::AppendEntriesResponse(response), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Follower);
        assert_eq!(outcome.term, 5);
        assert!(outcome.progress.is_empty());
        assert!(outcome.log_commands.is_empty());
    }

    #[test]
    fn same_term_vote_request_is_denied() {
        let state = leader_state(1, 2, &[2, 3], 1);
        let log = log_with_terms(&[2]);

        let request = crate::raft::messages::VoteRequest {
            from: ReplicaId(3),
            term: 2,
            candidate: ReplicaId(3),
            last_log_index: 5,
            last_log_term: 2,
        };
        let outcome = handle(&RaftMessage::VoteRequest(request), &state, &log).unwrap();

        assert_eq!(outcome.role, Role::Leader);
        match &outcome.outbound[0].message {
            RaftMessage::VoteResponse(response) => assert!(!response.vote_granted),
            other => panic!("unexpected response {:?}", other),
        }
    }
}
