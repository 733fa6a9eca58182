//! The Raft-backed KV store's public API (§4.6): `set`/`unset` submit a
//! command through Raft and wait for it to commit; `get`/`keys` serve
//! reads locally, gated on leadership (the read-index optimization named
//! in §4.6 — a follower returns [`Error::NotLeader`] rather than serving
//! possibly-stale data).

use std::time::Duration;

use storage::{Command, KvError, SharedKv};

use crate::error::{Error, Result};
use crate::raft_engine::RaftEngine;

/// The default time `set`/`unset` wait for their command to commit before
/// giving up and returning [`Error::Timeout`].
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Kv {
    kv: SharedKv,
    raft: std::sync::Arc<RaftEngine>,
    client_id: u16,
}

impl Kv {
    pub fn new(kv: SharedKv, raft: std::sync::Arc<RaftEngine>, client_id: u16) -> Self {
        Kv { kv, raft, client_id }
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let command = Command::set(key, value).map_err(command_error)?;
        self.submit(command)
    }

    pub fn unset(&self, key: Vec<u8>) -> Result<()> {
        let command = Command::unset(key).map_err(command_error)?;
        self.submit(command)
    }

    fn submit(&self, command: Command) -> Result<()> {
        let now = crate::time::now_ms();
        let (index, _term) = self
            .raft
            .submit(command.encode(), self.client_id, now)
            .map_err(|e| Error::NotLeader { leader_id: e.leader_id })?;
        if self.kv.wait_applied(index, DEFAULT_COMMIT_TIMEOUT) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// §4.6 read path: only the leader serves reads.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.raft.is_leader() {
            return Err(Error::NotLeader { leader_id: self.raft.leader_id() });
        }
        Ok(self.kv.read().get(key).map(|r| r.value.clone()))
    }

    /// Eventually-consistent key listing (§4.6), served from local state
    /// regardless of leadership.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.kv.read().keys()
    }

    pub fn len(&self) -> usize {
        self.kv.read().len()
    }
}

fn command_error(e: KvError) -> Error {
    Error::InvalidArgument(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_maps_to_invalid_argument() {
        match command_error(KvError::InvalidKey) {
            Error::InvalidArgument(_) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }
}
