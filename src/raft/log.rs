use super::types::{LogEntry, LogIndex, Term};
use crate::util::errors::{RaftError, Result};

/// Ordered, 0-indexed sequence of (term, content) entries.
///
/// Truncation must only be invoked with indices <= `append_index()`, and
/// callers must never truncate already-committed entries; both are fatal
/// programming errors, not recoverable conditions.
pub trait ReplicatedLog: Send {
    /// Append one entry at the tail and return its index.
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex>;

    /// Discard all entries from `from_index` (inclusive) to the tail.
    fn truncate(&mut self, from_index: LogIndex) -> Result<()>;

    /// Term of the entry at `index`, or None when the log holds no such entry.
    fn term_at(&self, index: LogIndex) -> Option<Term>;

    /// Index of the last written entry, -1 when the log is empty.
    fn append_index(&self) -> LogIndex;

    /// Index below which entries have been discarded by compaction, -1 when
    /// the full history is present.
    fn prev_index(&self) -> LogIndex;

    /// All entries from `from_index` (inclusive) to the tail.
    fn read_from(&self, from_index: LogIndex) -> Result<Vec<LogEntry>>;

    /// Term of the last entry, -1 when the log is empty.
    fn last_term(&self) -> Term {
        self.term_at(self.append_index()).unwrap_or(-1)
    }
}

/// Heap-backed log, used by the role handler tests and as the reference
/// semantics for the durable implementation.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    prev_index: LogIndex,
    prev_term: Term,
    entries: Vec<LogEntry>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self {
            prev_index: -1,
            prev_term: -1,
            entries: Vec::new(),
        }
    }

    /// Discard the prefix up to and including `up_to_index`, as log
    /// compaction would after a snapshot. Keeps the boundary term so the
    /// consistency check still works across the pruned edge.
    pub fn prune(&mut self, up_to_index: LogIndex) {
        if up_to_index <= self.prev_index {
            return;
        }
        assert!(
            up_to_index <= self.append_index(),
            "cannot prune up to {} past append index {}",
            up_to_index,
            self.append_index()
        );
        let boundary_term = self.term_at(up_to_index).unwrap_or(-1);
        let keep_from = (up_to_index - self.prev_index) as usize;
        self.entries.drain(..keep_from);
        self.prev_index = up_to_index;
        self.prev_term = boundary_term;
    }

    fn offset(&self, index: LogIndex) -> Option<usize> {
        if index <= self.prev_index || index > self.append_index() {
            None
        } else {
            Some((index - self.prev_index - 1) as usize)
        }
    }
}

impl ReplicatedLog for InMemoryLog {
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex> {
        if entry.term < self.last_term() {
            return Err(RaftError::LogInconsistency(format!(
                "appending term {} after term {}",
                entry.term,
                self.last_term()
            )));
        }
        self.entries.push(entry);
        Ok(self.append_index())
    }

    fn truncate(&mut self, from_index: LogIndex) -> Result<()> {
        assert!(
            from_index > self.prev_index && from_index <= self.append_index(),
            "truncate from {} outside ({}, {}]",
            from_index,
            self.prev_index,
            self.append_index()
        );
        self.entries
            .truncate((from_index - self.prev_index - 1) as usize);
        Ok(())
    }

    fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == self.prev_index && index >= 0 {
            return Some(self.prev_term);
        }
        self.offset(index).map(|i| self.entries[i].term)
    }

    fn append_index(&self) -> LogIndex {
        self.prev_index + self.entries.len() as LogIndex
    }

    fn prev_index(&self) -> LogIndex {
        self.prev_index
    }

    fn read_from(&self, from_index: LogIndex) -> Result<Vec<LogEntry>> {
        if from_index <= self.prev_index {
            return Err(RaftError::LogInconsistency(format!(
                "entries below {} have been compacted away",
                self.prev_index + 1
            )));
        }
        match self.offset(from_index) {
            Some(i) => Ok(self.entries[i..].to_vec()),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_reports_sentinels() {
        let log = InMemoryLog::new();
        assert_eq!(log.append_index(), -1);
        assert_eq!(log.prev_index(), -1);
        assert_eq!(log.last_term(), -1);
        assert_eq!(log.term_at(0), None);
    }

    #[test]
    fn append_returns_zero_based_indices() {
        let mut log = InMemoryLog::new();
        assert_eq!(log.append(LogEntry::new(1, vec![1])).unwrap(), 0);
        assert_eq!(log.append(LogEntry::new(1, vec![2])).unwrap(), 1);
        assert_eq!(log.append_index(), 1);
        assert_eq!(log.term_at(0), Some(1));
    }

    #[test]
    fn append_rejects_term_regression() {
        let mut log = InMemoryLog::new();
        log.append(LogEntry::new(3, vec![1])).unwrap();
        assert!(log.append(LogEntry::new(2, vec![2])).is_err());
    }

    #[test]
    fn truncate_discards_tail() {
        let mut log = InMemoryLog::new();
        for i in 0..4 {
            log.append(LogEntry::new(1, vec![i])).unwrap();
        }
        log.truncate(2).unwrap();
        assert_eq!(log.append_index(), 1);
        assert_eq!(log.term_at(2), None);
    }

    #[test]
    fn read_from_returns_suffix() {
        let mut log = InMemoryLog::new();
        for i in 0..3 {
            log.append(LogEntry::new(1, vec![i])).unwrap();
        }
        let suffix = log.read_from(1).unwrap();
        assert_eq!(suffix.len(), 2);
        assert_eq!(suffix[0].content, vec![1]);
        assert!(log.read_from(5).unwrap().is_empty());
    }

    #[test]
    fn prune_moves_log_start_and_keeps_boundary_term() {
        let mut log = InMemoryLog::new();
        for i in 0..5 {
            log.append(LogEntry::new(2, vec![i])).unwrap();
        }
        log.prune(2);
        assert_eq!(log.prev_index(), 2);
        assert_eq!(log.append_index(), 4);
        assert_eq!(log.term_at(2), Some(2));
        assert_eq!(log.term_at(1), None);
        assert!(log.read_from(2).is_err());
        assert_eq!(log.read_from(3).unwrap().len(), 2);
    }
}
