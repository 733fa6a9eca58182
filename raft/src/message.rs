//! Logical (non-wire) types shared by the Raft state machine.
//!
//! Byte-level encoding of these types for the RPC substrate lives in
//! [`crate::wire`]; this module only describes the in-memory shapes the
//! [`core`](crate::core) state machine operates on.

/// Identity of a Raft peer. The owning node program assigns these; `0` is
/// never a valid peer id.
pub type NodeId = u16;

/// A Raft term number. Terms are monotonically increasing and totally order
/// leadership epochs.
pub type Term = u64;

/// A 1-based index into the replicated log. `0` means "no entry".
pub type LogIndex = u64;

/// The kind of a log entry, per the wire `type` byte in §6 of the spec this
/// crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// An application-submitted command, opaque to Raft.
    Command = 1,
    /// A cluster configuration change. Not currently produced by this
    /// implementation (see `DESIGN.md`); reserved so the wire format and
    /// `EntryType` stay forward compatible with a future membership-via-log
    /// design.
    Configuration = 2,
    /// The no-op entry a new leader appends on election, establishing the
    /// "read-your-writes" commit barrier.
    Noop = 3,
}

impl EntryType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(EntryType::Command),
            2 => Some(EntryType::Configuration),
            3 => Some(EntryType::Noop),
            _ => None,
        }
    }
}

/// A single entry in the replicated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub term: Term,
    pub index: LogIndex,
    pub entry_type: EntryType,
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
    pub client_id: u16,
}

/// The role a Raft node currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    /// Not part of the Raft protocol proper; set once the engine has been
    /// asked to shut down so timer threads stop issuing RPCs.
    ShuttingDown,
}

/// Per-peer state the leader keeps (§3 "Leader state").
#[derive(Debug, Clone, Copy)]
pub struct PeerProgress {
    pub next_index: LogIndex,
    pub match_index: LogIndex,
}

impl PeerProgress {
    pub fn new(last_log_index: LogIndex) -> Self {
        PeerProgress {
            next_index: last_log_index + 1,
            match_index: 0,
        }
    }
}

/// Snapshot metadata persisted alongside the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotMeta {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
}
