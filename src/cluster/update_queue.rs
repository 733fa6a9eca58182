//! Bounded FIFO of pending member updates to piggyback (§2 L3, §8
//! "update queue at capacity").

use std::collections::VecDeque;
use std::sync::Mutex;

use super::Member;

pub struct UpdateQueue {
    capacity: usize,
    queue: Mutex<VecDeque<Member>>,
    rejected: std::sync::atomic::AtomicU64,
}

impl UpdateQueue {
    pub fn new(capacity: usize) -> Self {
        UpdateQueue {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            rejected: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns `false` (rejection) if the queue is at capacity; the caller
    /// drops the update with a warning and bumps a counter, per §7.
    pub fn push(&self, update: Member) -> bool {
        let mut queue = self.queue.lock().expect("update queue lock poisoned");
        if queue.len() >= self.capacity {
            self.rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return false;
        }
        queue.push_back(update);
        true
    }

    pub fn pop(&self) -> Option<Member> {
        self.queue.lock().expect("update queue lock poisoned").pop_front()
    }

    /// Pops up to `n` updates, draining the queue even while it is at
    /// capacity (§8: "pops continue to drain").
    pub fn drain_up_to(&self, n: usize) -> Vec<Member> {
        let mut queue = self.queue.lock().expect("update queue lock poisoned");
        let take = n.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("update queue lock poisoned").len()
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::member::{NodeType, Status};
    use std::net::{IpAddr, Ipv4Addr};

    fn member(id: u16) -> Member {
        Member {
            node_id: id,
            node_type: NodeType::Worker,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gossip_port: 10000,
            data_port: 20000,
            status: Status::Alive,
            incarnation: 0,
            last_seen_ms: 0,
        }
    }

    #[test]
    fn push_rejects_at_capacity_but_pop_still_drains() {
        let q = UpdateQueue::new(2);
        assert!(q.push(member(1)));
        assert!(q.push(member(2)));
        assert!(!q.push(member(3)));
        assert_eq!(q.rejected_count(), 1);
        assert!(q.pop().is_some());
        assert!(q.push(member(3)));
    }

    #[test]
    fn drain_up_to_respects_queue_size() {
        let q = UpdateQueue::new(10);
        for id in 1..=3 {
            q.push(member(id));
        }
        let drained = q.drain_up_to(10);
        assert_eq!(drained.len(), 3);
        assert_eq!(q.len(), 0);
    }
}
