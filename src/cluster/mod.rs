//! The cluster view (§4.1): the single source of truth for membership,
//! shared under one readers-writer lock. `get` used to return a pointer
//! valid only while a lock was held, paired with an explicit `release`
//! call (REDESIGN FLAGS, §9) — `MemberRef` replaces that pattern with a
//! guard whose `Drop` releases the lock and whose borrow cannot outlive
//! it.

pub mod member;
pub mod update_queue;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{RwLock, RwLockReadGuard};

pub use member::{Member, NodeType, Status};

/// A read-locked borrow of one member. Dropping it releases the cluster
/// view's read lock; there is no explicit `release` to call.
pub struct MemberRef<'a> {
    guard: RwLockReadGuard<'a, HashMap<u16, Member>>,
    node_id: u16,
}

impl<'a> Deref for MemberRef<'a> {
    type Target = Member;

    fn deref(&self) -> &Member {
        self.guard
            .get(&self.node_id)
            .expect("MemberRef constructed only when the entry is present")
    }
}

pub struct ClusterView {
    members: RwLock<HashMap<u16, Member>>,
    local_node_id: u16,
}

impl ClusterView {
    pub fn new(local_node_id: u16) -> Self {
        ClusterView {
            members: RwLock::new(HashMap::new()),
            local_node_id,
        }
    }

    /// Insert or update by `node_id`. Thread-safe.
    pub fn add(&self, member: Member) {
        let mut guard = self.members.write().expect("cluster view lock poisoned");
        guard.insert(member.node_id, member);
    }

    /// Changes status only if `incarnation >= current`; equal incarnation
    /// allows escalation `alive -> suspect -> dead` but never demotion.
    /// Returns `true` if the status actually changed.
    pub fn update_status(&self, id: u16, status: Status, incarnation: u64) -> bool {
        let mut guard = self.members.write().expect("cluster view lock poisoned");
        let member = match guard.get_mut(&id) {
            Some(member) => member,
            None => return false,
        };
        if incarnation < member.incarnation {
            return false;
        }
        if incarnation == member.incarnation && status.rank() <= member.status.rank() {
            return false;
        }
        member.status = status;
        member.incarnation = incarnation;
        true
    }

    /// Touches `last_seen_ms` without otherwise changing the member, per
    /// the "update on every inbound message" reading of the `dead_timeout`
    /// open question (see DESIGN.md).
    pub fn touch(&self, id: u16, now_ms: u64) {
        let mut guard = self.members.write().expect("cluster view lock poisoned");
        if let Some(member) = guard.get_mut(&id) {
            member.last_seen_ms = now_ms;
        }
    }

    pub fn remove(&self, id: u16) -> Option<Member> {
        let mut guard = self.members.write().expect("cluster view lock poisoned");
        guard.remove(&id)
    }

    pub fn get(&self, id: u16) -> Option<MemberRef<'_>> {
        let guard = self.members.read().expect("cluster view lock poisoned");
        if guard.contains_key(&id) {
            Some(MemberRef { guard, node_id: id })
        } else {
            None
        }
    }

    pub fn contains(&self, id: u16) -> bool {
        self.members.read().expect("cluster view lock poisoned").contains_key(&id)
    }

    pub fn list_by_type(&self, node_type: NodeType) -> Vec<Member> {
        self.members
            .read()
            .expect("cluster view lock poisoned")
            .values()
            .filter(|m| m.node_type == node_type)
            .cloned()
            .collect()
    }

    pub fn list_alive(&self) -> Vec<Member> {
        self.members
            .read()
            .expect("cluster view lock poisoned")
            .values()
            .filter(|m| m.status != Status::Dead)
            .cloned()
            .collect()
    }

    /// Non-dead peers excluding the local node, for gossip target selection.
    pub fn list_peers(&self) -> Vec<Member> {
        self.members
            .read()
            .expect("cluster view lock poisoned")
            .values()
            .filter(|m| m.status != Status::Dead && m.node_id != self.local_node_id)
            .cloned()
            .collect()
    }

    pub fn local_node_id(&self) -> u16 {
        self.local_node_id
    }

    pub fn len(&self) -> usize {
        self.members.read().expect("cluster view lock poisoned").len()
    }

    /// A structured snapshot for debugging only — not used on any hot path.
    pub fn dump(&self) -> Vec<Member> {
        self.members.read().expect("cluster view lock poisoned").values().cloned().collect()
    }
}
