//! Pure Raft consensus state machine: election, log replication, commit
//! advancement, and (single-chunk) snapshot install.
//!
//! This crate has no knowledge of sockets, threads, or timers — it is
//! driven forward by an owning engine calling [`core::RaftCore::tick_election`],
//! [`core::RaftCore::tick_heartbeat`], and [`core::RaftCore::tick_apply`] at
//! roughly the intervals named in its [`core::Config`], and by feeding it
//! decoded RPCs via the `handle_*` methods. See `raft_engine` in the root
//! crate for the thread- and socket-facing half of Raft.

#[macro_use]
mod macros;

pub mod callbacks;
pub mod consensus;
pub mod core;
pub mod log;
pub mod message;
pub mod wire;

pub use callbacks::RaftCallbacks;
pub use core::{Config, NotLeaderError, Outbound, RaftCore, Stats};
