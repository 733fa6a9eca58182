//! Storage for the Raft replicated log.
//!
//! The [`Log`] trait is the only interface [`core::RaftCore`](crate::core::RaftCore)
//! uses to read and write log entries; it never assumes a backing medium.
//! Indices are 1-based and dense: the first entry ever appended has index 1,
//! and `last_index() + 1` is always the index the next `append` will use
//! (after any `truncate_suffix`).

pub mod file;
pub mod memory;

use crate::message::{LogEntry, LogIndex, SnapshotMeta, Term};

/// Backing storage for a Raft node's replicated log plus the small amount of
/// persistent state (`current_term`, `voted_for`, snapshot metadata) that
/// must survive a process restart alongside it.
pub trait Log {
    type Error: std::fmt::Debug;

    /// Appends `entry` to the end of the log. The caller guarantees
    /// `entry.index == last_index() + 1`.
    fn append(&mut self, entry: LogEntry) -> Result<(), Self::Error>;

    /// Removes every entry with index `>= from_index`, returning the number
    /// removed. Used when AppendEntries finds a conflicting suffix.
    fn truncate_suffix(&mut self, from_index: LogIndex) -> Result<usize, Self::Error>;

    /// Discards every entry with index `<= upto_index` after a snapshot has
    /// taken responsibility for them. `upto_index` may exceed `last_index`,
    /// in which case the whole log is cleared.
    fn truncate_prefix(&mut self, upto_index: LogIndex) -> Result<(), Self::Error>;

    /// Returns the entry at `index`, or `None` if it has never existed or
    /// has been discarded by a snapshot.
    fn get(&self, index: LogIndex) -> Option<LogEntry>;

    /// Returns the term of the entry at `index`. Falls back to the
    /// snapshot's `last_included_term` when `index == snapshot_meta().last_included_index`.
    fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == self.snapshot_meta().last_included_index {
            return Some(self.snapshot_meta().last_included_term);
        }
        self.get(index).map(|e| e.term)
    }

    /// The index of the last entry in the log (not including a discarded
    /// prefix), or the snapshot's last index if the log is otherwise empty.
    fn last_index(&self) -> LogIndex;

    /// The term of the last entry, or the snapshot's last term if the log is
    /// otherwise empty.
    fn last_term(&self) -> Term {
        self.term_at(self.last_index()).unwrap_or(0)
    }

    /// Persists `current_term` and `voted_for` durably before any RPC
    /// response referencing them is sent (Raft §5.1/§5.2 durability rule).
    fn save_term_and_vote(&mut self, term: Term, voted_for: NodeIdOpt) -> Result<(), Self::Error>;

    /// Reads back the persisted `(current_term, voted_for)` pair, or
    /// `(0, None)` for a brand new log.
    fn load_term_and_vote(&self) -> (Term, NodeIdOpt);

    /// Installs snapshot metadata, implying `truncate_prefix` up to
    /// `meta.last_included_index` has already happened.
    fn save_snapshot_meta(&mut self, meta: SnapshotMeta) -> Result<(), Self::Error>;

    fn snapshot_meta(&self) -> SnapshotMeta;
}

/// `voted_for`, where `None` is encoded as node id `0` on the wire (§3).
pub type NodeIdOpt = Option<crate::message::NodeId>;
