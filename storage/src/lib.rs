//! Raft-backed key-value state machine.
//!
//! This crate owns the wire format for KV commands (`command`), the record
//! model those commands produce (`record`), and the state machine itself
//! (`kv`), which implements [`raft::RaftCallbacks`] so a `raft::RaftCore`
//! can drive it directly as committed entries are applied.

pub mod command;
pub mod error;
pub mod kv;
pub mod record;

pub use command::Command;
pub use error::{KvError, Result};
pub use kv::{KvStateMachine, SharedKv};
pub use record::KvRecord;
