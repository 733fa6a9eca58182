//! A non-durable [`Log`] implementation for tests and simulation.
//!
//! `InMemoryLog` never survives a process restart; production deployments
//! use [`super::file::FileLog`] instead. Kept here because the test suite
//! (and anything benchmarking the Raft core in isolation) wants a `Log`
//! with no I/O latency.

use std::collections::VecDeque;

use super::{Log, NodeIdOpt};
use crate::message::{LogEntry, LogIndex, SnapshotMeta, Term};

#[derive(Debug, Default)]
pub struct InMemoryLog {
    /// Entries with index `offset + 1 ..= offset + entries.len()`.
    entries: VecDeque<LogEntry>,
    offset: LogIndex,
    current_term: Term,
    voted_for: NodeIdOpt,
    snapshot_meta: SnapshotMeta,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        if index <= self.offset {
            return None;
        }
        let pos = (index - self.offset - 1) as usize;
        if pos < self.entries.len() {
            Some(pos)
        } else {
            None
        }
    }
}

impl Log for InMemoryLog {
    type Error = std::convert::Infallible;

    fn append(&mut self, entry: LogEntry) -> Result<(), Self::Error> {
        self.entries.push_back(entry);
        Ok(())
    }

    fn truncate_suffix(&mut self, from_index: LogIndex) -> Result<usize, Self::Error> {
        match self.position(from_index) {
            Some(pos) => {
                let removed = self.entries.len() - pos;
                self.entries.truncate(pos);
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    fn truncate_prefix(&mut self, upto_index: LogIndex) -> Result<(), Self::Error> {
        while let Some(front) = self.entries.front() {
            if front.index <= upto_index {
                self.entries.pop_front();
                self.offset += 1;
            } else {
                break;
            }
        }
        if upto_index > self.offset {
            self.offset = upto_index;
        }
        Ok(())
    }

    fn get(&self, index: LogIndex) -> Option<LogEntry> {
        self.position(index).map(|pos| self.entries[pos].clone())
    }

    fn last_index(&self) -> LogIndex {
        self.offset + self.entries.len() as LogIndex
    }

    fn save_term_and_vote(&mut self, term: Term, voted_for: NodeIdOpt) -> Result<(), Self::Error> {
        self.current_term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> (Term, NodeIdOpt) {
        (self.current_term, self.voted_for)
    }

    fn save_snapshot_meta(&mut self, meta: SnapshotMeta) -> Result<(), Self::Error> {
        self.snapshot_meta = meta;
        Ok(())
    }

    fn snapshot_meta(&self) -> SnapshotMeta {
        self.snapshot_meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EntryType;

    fn entry(index: LogIndex, term: Term) -> LogEntry {
        LogEntry {
            term,
            index,
            entry_type: EntryType::Command,
            data: vec![],
            timestamp_ms: 0,
            client_id: 0,
        }
    }

    #[test]
    fn append_and_get_are_dense() {
        let mut log = InMemoryLog::new();
        log.append(entry(1, 1)).unwrap();
        log.append(entry(2, 1)).unwrap();
        log.append(entry(3, 2)).unwrap();

        assert_eq!(log.last_index(), 3);
        assert_eq!(log.last_term(), 2);
        assert_eq!(log.get(2).unwrap().term, 1);
        assert!(log.get(4).is_none());
    }

    #[test]
    fn truncate_suffix_removes_conflicting_tail() {
        let mut log = InMemoryLog::new();
        for i in 1..=5 {
            log.append(entry(i, 1)).unwrap();
        }
        let removed = log.truncate_suffix(3).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(log.last_index(), 2);
        assert!(log.get(3).is_none());
    }

    #[test]
    fn truncate_prefix_discards_applied_entries() {
        let mut log = InMemoryLog::new();
        for i in 1..=5 {
            log.append(entry(i, 1)).unwrap();
        }
        log.truncate_prefix(3).unwrap();
        assert!(log.get(2).is_none());
        assert!(log.get(4).is_some());
        assert_eq!(log.last_index(), 5);
    }

    #[test]
    fn term_and_vote_round_trip() {
        let mut log = InMemoryLog::new();
        log.save_term_and_vote(7, Some(3)).unwrap();
        assert_eq!(log.load_term_and_vote(), (7, Some(3)));
    }
}
