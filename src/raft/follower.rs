use super::log::ReplicatedLog;
use super::messages::{
    AppendEntriesRequest, AppendEntriesResponse, Heartbeat, LogCompactionInfo, RaftMessage,
    VoteRequest, VoteResponse,
};
use super::outcome::Outcome;
use super::state::{ReplicaState, Role};
use super::types::LogIndex;
use crate::util::errors::Result;

/// Follower handler: pure function of (event, state, log).
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
            receive_vote_request(&mut outcome, state, log, request);
        }
        RaftMessage::AppendEntriesRequest(request) => {
            receive_append_request(&mut outcome, state, log, request);
        }
        RaftMessage::Heartbeat(heartbeat) => {
            receive_heartbeat(&mut outcome, state, log, heartbeat);
        }
        RaftMessage::LogCompactionInfo(info) => {
            receive_compaction_info(&mut outcome, log, info);
        }
        RaftMessage::ElectionTimeout => {
            start_election(&mut outcome, state, log);
        }
        RaftMessage::NewEntry(_) | RaftMessage::NewEntryBatch(_) => {
            tracing::debug!(
                "Replica {} dropped client entry, not the leader (leader hint: {:?})",
                state.id,
                outcome.leader
            );
        }
        RaftMessage::VoteResponse(_)
        | RaftMessage::AppendEntriesResponse(_)
        | RaftMessage::HeartbeatTimeout => {}
    }

    Ok(outcome)
}

/// Vote granting rule, shared with the candidate role. Assumes any higher
/// term has already been adopted into `outcome`.
pub(crate) fn receive_vote_request(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    request: &VoteRequest,
) {
    if request.term < outcome.term {
        tracing::debug!(
            "Replica {} denied vote to {}, stale term ({} < {})",
            state.id,
            request.candidate,
            request.term,
            outcome.term
        );
        respond_vote(outcome, state, request, false);
        return;
    }

    let vote_free =
        outcome.voted_for.is_none() || outcome.voted_for == Some(request.candidate);
    // Lexicographic (term, index): the candidate's log must be at least as
    // up to date as ours.
    let up_to_date = (request.last_log_term, request.last_log_index)
        >= (log.last_term(), log.append_index());

    if vote_free && up_to_date {
        outcome.voted_for = Some(request.candidate);
        outcome.renew_election_timeout = true;
        tracing::info!(
            "Replica {} granted vote to {} in term {}",
            state.id,
            request.candidate,
            outcome.term
        );
        respond_vote(outcome, state, request, true);
    } else {
        tracing::debug!(
            "Replica {} denied vote to {} (vote free: {}, log up to date: {})",
            state.id,
            request.candidate,
            vote_free,
            up_to_date
        );
        respond_vote(outcome, state, request, false);
    }
}

fn respond_vote(
    outcome: &mut Outcome,
    state: &ReplicaState,
    request: &VoteRequest,
    granted: bool,
) {
    outcome.send(
        request.from,
        RaftMessage::VoteResponse(VoteResponse {
            from: state.id,
            term: outcome.term,
            vote_granted: granted,
        }),
    );
}

/// AppendEntries consistency check and positional, idempotent append. Shared
/// with the candidate role, which steps down before calling this.
pub(crate) fn receive_append_request(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    request: &AppendEntriesRequest,
) {
    if request.leader_term < outcome.term {
        tracing::debug!(
            "Replica {} rejected append from {}, stale term ({} < {})",
            state.id,
            request.from,
            request.leader_term,
            outcome.term
        );
        outcome.send(
            request.from,
            RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
                from: state.id,
                term: outcome.term,
                success: false,
                match_index: -1,
                append_index: log.append_index(),
            }),
        );
        return;
    }

    outcome.leader = Some(request.from);
    outcome.renew_election_timeout = true;

    let consistent = request.prev_log_index == -1
        || log.term_at(request.prev_log_index) == Some(request.prev_log_term);
    if !consistent {
        tracing::debug!(
            "Replica {} rejected append from {}, no entry with term {} at {}",
            state.id,
            request.from,
            request.prev_log_term,
            request.prev_log_index
        );
        outcome.send(
            request.from,
            RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
                from: state.id,
                term: outcome.term,
                success: false,
                match_index: -1,
                append_index: log.append_index(),
            }),
        );
        return;
    }

    // Walk the supplied entries positionally: skip what we already hold,
    // truncate on the first term conflict, append the rest.
    let base = request.prev_log_index;
    let mut append_index = log.append_index();
    for (offset, entry) in request.entries.iter().enumerate() {
        let index = base + 1 + offset as LogIndex;
        match log.term_at(index) {
            Some(local_term) if local_term == entry.term => continue,
            Some(_) => {
                tracing::info!(
                    "Replica {} found log conflict at {}, truncating",
                    state.id,
                    index
                );
                outcome.truncate(index);
                outcome.append(index, request.entries[offset..].to_vec());
                append_index = base + request.entries.len() as LogIndex;
                break;
            }
            None => {
                outcome.append(index, request.entries[offset..].to_vec());
                append_index = base + request.entries.len() as LogIndex;
                break;
            }
        }
    }

    let match_index = base + request.entries.len() as LogIndex;

    // leaderCommit is trusted only up to what this request proved identical
    // to the leader's log; the heartbeat path does a term check instead.
    let commit_to = request.leader_commit.min(match_index);
    if commit_to > state.commit_index {
        outcome.advance_commit(commit_to);
    }

    outcome.send(
        request.from,
        RaftMessage::AppendEntriesResponse(AppendEntriesResponse {
            from: state.id,
            term: outcome.term,
            success: true,
            match_index,
            append_index,
        }),
    );
}

/// A heartbeat never appends. The commit claim is honored only when the local
/// log already holds the advertised entry with the advertised term; otherwise
/// the decision is deferred to a future append that extends history far
/// enough to verify it.
pub(crate) fn receive_heartbeat(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
    heartbeat: &Heartbeat,
) {
    if heartbeat.leader_term < outcome.term {
        tracing::debug!(
            "Replica {} ignored stale heartbeat from {} (term {} < {})",
            state.id,
            heartbeat.from,
            heartbeat.leader_term,
            outcome.term
        );
        return;
    }

    outcome.leader = Some(heartbeat.from);
    outcome.renew_election_timeout = true;

    if heartbeat.commit_index > state.commit_index
        && log.term_at(heartbeat.commit_index) == Some(heartbeat.commit_index_term)
    {
        outcome.advance_commit(heartbeat.commit_index);
    }
}

pub(crate) fn receive_compaction_info(
    outcome: &mut Outcome,
    log: &dyn ReplicatedLog,
    info: &LogCompactionInfo,
) {
    if info.leader_term < outcome.term {
        return;
    }
    if log.prev_index() >= info.prev_index {
        // Our log already starts at or beyond the leader's.
        return;
    }
    tracing::warn!(
        "Leader {} compacted up to {}, local log starts at {}; state transfer required",
        info.from,
        info.prev_index,
        log.prev_index() + 1
    );
    outcome.needs_state_transfer = true;
}

/// Start (or restart) an election: new term, self-vote, VoteRequests to every
/// known member. Shared with the candidate role.
pub(crate) fn start_election(
    outcome: &mut Outcome,
    state: &ReplicaState,
    log: &dyn ReplicatedLog,
) {
    if state.members.is_empty() {
        // No topology yet; an election cannot be won, so stay put.
        tracing::debug!(
            "Replica {} election timeout with no known members, staying follower",
            state.id
        );
        outcome.renew_election_timeout = true;
        return;
    }

    outcome.role = Role::Candidate;
    outcome.term += 1;
    outcome.voted_for = Some(state.id);
    outcome.leader = None;
    outcome.votes_received.clear();
    outcome.votes_received.insert(state.id);
    outcome.renew_election_timeout = true;

    tracing::info!(
        "Replica {} starting election for term {}",
        state.id,
        outcome.term
    );

    for member in &state.members {
        outcome.send(
            *member,
            RaftMessage::VoteRequest(VoteRequest {
                from: state.id,
                term: outcome.term,
                candidate: state.id,
                last_log_index: log.append_index(),
                last_log_term: log.last_term(),
            }),
        );
    }
}
