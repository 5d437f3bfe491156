use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::raft::log::ReplicatedLog;
use crate::raft::types::{LogEntry, LogIndex, Term};
use crate::util::errors::{RaftError, Result};

/// File-backed replicated log.
///
/// Fixed big-endian record format, one record per entry: the term as 8
/// bytes, then a u32 length prefix and the opaque content. The whole log is
/// kept in memory and rewritten on truncation; appends go to the file tail.
pub struct FileLog {
    data_dir: PathBuf,
    entries: Vec<LogEntry>,
}

impl FileLog {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;

        let mut log = Self {
            data_dir,
            entries: Vec::new(),
        };
        log.load_from_disk()?;
        Ok(log)
    }

    fn log_file_path(&self) -> PathBuf {
        self.data_dir.join("replicated_log.bin")
    }

    fn load_from_disk(&mut self) -> Result<()> {
        let log_path = self.log_file_path();
        if !log_path.exists() {
            return Ok(());
        }

        let mut file = File::open(&log_path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let mut offset = 0;
        while offset < buffer.len() {
            if buffer.len() - offset < 12 {
                return Err(RaftError::SerializationError(format!(
                    "log file truncated inside record header at byte {}",
                    offset
                )));
            }
            let term = Term::from_be_bytes(buffer[offset..offset + 8].try_into().unwrap());
            let len =
                u32::from_be_bytes(buffer[offset + 8..offset + 12].try_into().unwrap()) as usize;
            offset += 12;
            if buffer.len() - offset < len {
                return Err(RaftError::SerializationError(format!(
                    "log file truncated inside record content at byte {}",
                    offset
                )));
            }
            let content = buffer[offset..offset + len].to_vec();
            offset += len;
            self.entries.push(LogEntry::new(term, content));
        }

        tracing::info!("Loaded {} log entries from disk", self.entries.len());
        Ok(())
    }

    fn append_to_disk(&self, entry: &LogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.log_file_path())?;
        file.write_all(&encode_entry(entry))?;
        file.sync_all()?;
        Ok(())
    }

    fn rewrite_disk(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.log_file_path())?;
        for entry in &self.entries {
            file.write_all(&encode_entry(entry))?;
        }
        file.sync_all()?;
        Ok(())
    }
}

fn encode_entry(entry: &LogEntry) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(12 + entry.content.len());
    buffer.extend_from_slice(&entry.term.to_be_bytes());
    buffer.extend_from_slice(&(entry.content.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&entry.content);
    buffer
}

impl ReplicatedLog for FileLog {
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex> {
        if entry.term < self.last_term() {
            return Err(RaftError::LogInconsistency(format!(
                "appending term {} after term {}",
                entry.term,
                self.last_term()
            )));
        }
        self.append_to_disk(&entry)?;
        self.entries.push(entry);
        Ok(self.append_index())
    }

    fn truncate(&mut self, from_index: LogIndex) -> Result<()> {
        assert!(
            from_index >= 0 && from_index <= self.append_index(),
            "truncate from {} outside [0, {}]",
            from_index,
            self.append_index()
        );
        self.entries.truncate(from_index as usize);
        self.rewrite_disk()?;
        tracing::info!("Truncated log from index {}", from_index);
        Ok(())
    }

    fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index < 0 || index > self.append_index() {
            return None;
        }
        Some(self.entries[index as usize].term)
    }

    fn append_index(&self) -> LogIndex {
        self.entries.len() as LogIndex - 1
    }

    fn prev_index(&self) -> LogIndex {
        // Compaction of the durable log is a collaborator concern; the full
        // history is always present here.
        -1
    }

    fn read_from(&self, from_index: LogIndex) -> Result<Vec<LogEntry>> {
        if from_index < 0 {
            return Err(RaftError::LogInconsistency(format!(
                "read from negative index {}",
                from_index
            )));
        }
        if from_index > self.append_index() {
            return Ok(Vec::new());
        }
        Ok(self.entries[from_index as usize..].to_vec())
    }
}
