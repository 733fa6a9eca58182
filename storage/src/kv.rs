//! The KV state machine and its [`raft::RaftCallbacks`] adapter.
//!
//! [`KvStateMachine`] is plain data with `&mut self` methods; it knows
//! nothing about Raft or threads. [`SharedKv`] wraps it in an
//! `Arc<RwLock<_>>` plus a commit condvar and implements
//! [`RaftCallbacks::on_apply`] by decoding the committed entry and calling
//! into the state machine under the write lock — this is the "atomically
//! under the KV write lock, bumping version, broadcasting a commit condvar"
//! apply path from §4.6. The owning `raft_engine` in the root crate hands a
//! clone of `SharedKv` to `RaftCore` as its callbacks object, and the root
//! crate's `kv` module clones it again for reads.

use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use raft::message::{LogEntry, SnapshotMeta};
use raft::RaftCallbacks;

use crate::command::Command;
use crate::record::KvRecord;

#[derive(Default)]
pub struct KvStateMachine {
    records: HashMap<Vec<u8>, KvRecord>,
}

impl KvStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&KvRecord> {
        self.records.get(key)
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Applies a decoded command at Raft log `index`, stamping `version`
    /// with that index per the KV record invariant in §3.
    pub fn apply(&mut self, command: &Command, index: u64, now_ms: u64) {
        match command {
            Command::Set { key, value } => {
                let created_at_ms = self
                    .records
                    .get(key)
                    .map(|r| r.created_at_ms)
                    .unwrap_or(now_ms);
                self.records.insert(
                    key.clone(),
                    KvRecord {
                        value: value.clone(),
                        version: index,
                        created_at_ms,
                        updated_at_ms: now_ms,
                    },
                );
            }
            Command::Unset { key } => {
                self.records.remove(key);
            }
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());
        for (key, record) in &self.records {
            out.extend_from_slice(&(key.len() as u16).to_be_bytes());
            out.extend_from_slice(key);
            out.extend_from_slice(&(record.value.len() as u32).to_be_bytes());
            out.extend_from_slice(&record.value);
            out.extend_from_slice(&record.version.to_be_bytes());
            out.extend_from_slice(&record.created_at_ms.to_be_bytes());
            out.extend_from_slice(&record.updated_at_ms.to_be_bytes());
        }
        out
    }

    fn restore(&mut self, data: &[u8]) {
        self.records.clear();
        let mut pos = 0usize;
        if data.len() < 4 {
            return;
        }
        let count = u32::from_be_bytes(data[0..4].try_into().unwrap());
        pos += 4;
        for _ in 0..count {
            if data.len() < pos + 2 {
                break;
            }
            let key_len = u16::from_be_bytes(data[pos..pos + 2].try_into().unwrap()) as usize;
            pos += 2;
            if data.len() < pos + key_len + 4 {
                break;
            }
            let key = data[pos..pos + key_len].to_vec();
            pos += key_len;
            let value_len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if data.len() < pos + value_len + 8 + 8 + 8 {
                break;
            }
            let value = data[pos..pos + value_len].to_vec();
            pos += value_len;
            let version = u64::from_be_bytes(data[pos..pos + 8].try_into().unwrap());
            pos += 8;
            let created_at_ms = u64::from_be_bytes(data[pos..pos + 8].try_into().unwrap());
            pos += 8;
            let updated_at_ms = u64::from_be_bytes(data[pos..pos + 8].try_into().unwrap());
            pos += 8;
            self.records.insert(key, KvRecord { value, version, created_at_ms, updated_at_ms });
        }
    }
}

/// Shared, thread-safe handle to a [`KvStateMachine`], cheap to `Clone`
/// (an `Arc` underneath). Implements [`RaftCallbacks`] so it can be handed
/// straight to [`raft::RaftCore`].
#[derive(Clone)]
pub struct SharedKv {
    state: Arc<RwLock<KvStateMachine>>,
    commit: Arc<(Mutex<u64>, Condvar)>,
}

impl SharedKv {
    pub fn new() -> Self {
        SharedKv {
            state: Arc::new(RwLock::new(KvStateMachine::new())),
            commit: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, KvStateMachine> {
        self.state.read().expect("kv rwlock poisoned")
    }

    /// Blocks until `last_applied >= index` or `timeout` elapses. Returns
    /// `true` if the index was observed applied.
    pub fn wait_applied(&self, index: u64, timeout: std::time::Duration) -> bool {
        let (lock, cvar) = &*self.commit;
        let guard = lock.lock().expect("kv commit mutex poisoned");
        if *guard >= index {
            return true;
        }
        let (guard, result) = cvar
            .wait_timeout_while(guard, timeout, |applied| *applied < index)
            .expect("kv commit mutex poisoned");
        !result.timed_out() && *guard >= index
    }
}

impl Default for SharedKv {
    fn default() -> Self {
        Self::new()
    }
}

impl RaftCallbacks for SharedKv {
    fn on_apply(&mut self, entry: &LogEntry) {
        if !matches!(entry.entry_type, raft::message::EntryType::Command) {
            let (lock, cvar) = &*self.commit;
            let mut applied = lock.lock().expect("kv commit mutex poisoned");
            *applied = entry.index;
            cvar.notify_all();
            return;
        }
        match Command::decode(&entry.data) {
            Ok(command) => {
                let mut state = self.state.write().expect("kv rwlock poisoned");
                state.apply(&command, entry.index, entry.timestamp_ms);
            }
            Err(err) => {
                log::error!("dropping malformed committed command at index {}: {}", entry.index, err);
            }
        }
        let (lock, cvar) = &*self.commit;
        let mut applied = lock.lock().expect("kv commit mutex poisoned");
        *applied = entry.index;
        cvar.notify_all();
    }

    fn on_snapshot_create(&mut self) -> (Vec<u8>, SnapshotMeta) {
        let state = self.state.read().expect("kv rwlock poisoned");
        (state.snapshot(), SnapshotMeta::default())
    }

    fn on_snapshot_restore(&mut self, data: &[u8], _meta: SnapshotMeta) {
        let mut state = self.state.write().expect("kv rwlock poisoned");
        state.restore(data);
    }
}
