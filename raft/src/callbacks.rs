//! The capability trait [`core::RaftCore`](crate::core::RaftCore) invokes
//! instead of the "raw (fn_pointer, void_ptr) callback" design the ported
//! source used — see `DESIGN.md`'s REDESIGN FLAGS entry.

use crate::message::{LogEntry, SnapshotMeta};

/// Hooks the owning node program implements to receive Raft's effects.
/// `RaftCore` itself performs no I/O and no state-machine application; it
/// only decides *that* an entry is committed and hands it here.
pub trait RaftCallbacks {
    /// Called exactly once per committed entry, strictly in increasing
    /// index order, from the apply thread.
    fn on_apply(&mut self, entry: &LogEntry);

    /// Called when the engine needs a snapshot of the current state
    /// machine to send via `InstallSnapshot`, or to compact its own log.
    /// Returns the opaque snapshot bytes and the metadata describing what
    /// they cover.
    fn on_snapshot_create(&mut self) -> (Vec<u8>, SnapshotMeta);

    /// Called when a complete `InstallSnapshot` has been received and the
    /// state machine must be replaced wholesale from `data`.
    fn on_snapshot_restore(&mut self, data: &[u8], meta: SnapshotMeta);
}
