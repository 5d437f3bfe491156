use serde::{Deserialize, Serialize};

use super::types::{LogEntry, LogIndex, ReplicaId, Term};

/// Invoked by candidates to gather votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub from: ReplicaId,
    pub term: Term,
    pub candidate: ReplicaId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub from: ReplicaId,
    pub term: Term,
    pub vote_granted: bool,
}

/// Invoked by the leader to replicate log entries.
///
/// `prev_log_index == -1` and `prev_log_term == -1` together denote "log is
/// empty before this request"; exactly one of them being -1 is a precondition
/// violation, so construction goes through [`AppendEntriesRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub from: ReplicaId,
    pub leader_term: Term,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

impl AppendEntriesRequest {
    pub fn new(
        from: ReplicaId,
        leader_term: Term,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    ) -> Self {
        assert!(
            (prev_log_index == -1) == (prev_log_term == -1),
            "prevLogIndex was {} and prevLogTerm was {}",
            prev_log_index,
            prev_log_term
        );
        Self {
            from,
            leader_term,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub from: ReplicaId,
    pub term: Term,
    pub success: bool,
    /// Highest index now guaranteed identical to the leader's log.
    pub match_index: LogIndex,
    /// The responder's log tail after applying the request.
    pub append_index: LogIndex,
}

/// Keeps followers alive and carries a term-verifiable commit claim. Never
/// appends entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub from: ReplicaId,
    pub leader_term: Term,
    pub commit_index: LogIndex,
    pub commit_index_term: Term,
}

/// Tells a replica that the leader has discarded log entries at or below
/// `prev_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCompactionInfo {
    pub from: ReplicaId,
    pub leader_term: Term,
    pub prev_index: LogIndex,
}

/// Client-submitted content, only meaningful at a leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntryRequest {
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntryBatch {
    pub contents: Vec<Vec<u8>>,
}

/// The closed vocabulary of events a replica can process. Timeout variants
/// are generated locally and never travel over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendEntriesRequest(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
    Heartbeat(Heartbeat),
    LogCompactionInfo(LogCompactionInfo),
    ElectionTimeout,
    HeartbeatTimeout,
    NewEntry(NewEntryRequest),
    NewEntryBatch(NewEntryBatch),
}

impl RaftMessage {
    /// The sender's term, where the message carries one.
    pub fn term(&self) -> Option<Term> {
        match self {
            RaftMessage::VoteRequest(m) => Some(m.term),
            RaftMessage::VoteResponse(m) => Some(m.term),
            RaftMessage::AppendEntriesRequest(m) => Some(m.leader_term),
            RaftMessage::AppendEntriesResponse(m) => Some(m.term),
            RaftMessage::Heartbeat(m) => Some(m.leader_term),
            RaftMessage::LogCompactionInfo(m) => Some(m.leader_term),
            RaftMessage::ElectionTimeout
            | RaftMessage::HeartbeatTimeout
            | RaftMessage::NewEntry(_)
            | RaftMessage::NewEntryBatch(_) => None,
        }
    }
}

/// An outbound message paired with its destination, handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directed {
    pub to: ReplicaId,
    pub message: RaftMessage,
}

impl Directed {
    pub fn new(to: ReplicaId, message: RaftMessage) -> Self {
        Self { to, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_request_accepts_empty_log_sentinels() {
        let id = ReplicaId(1);
        let request = AppendEntriesRequest::new(id, 3, -1, -1, vec![], -1);
        assert_eq!(request.prev_log_index, -1);
        assert_eq!(request.prev_log_term, -1);
    }

    #[test]
    #[should_panic]
    fn append_request_rejects_mismatched_sentinels() {
        let id = ReplicaId(1);
        AppendEntriesRequest::new(id, 3, -1, 2, vec![], -1);
    }
}
