//! The pure SWIM state machine (§4.3): no socket I/O. All output happens
//! through the two callback families named in the REDESIGN FLAGS note —
//! `on_send_message` and the three member-event callbacks — instead of
//! raw `(fn_pointer, void_ptr)` pairs.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::cluster::member::{NodeType, Status};
use crate::cluster::update_queue::UpdateQueue;
use crate::cluster::{ClusterView, Member};
use crate::gossip::message::{GossipMessage, JoinResponse, MemberUpdate, MsgType, RouterRecord};

#[derive(Debug, Clone, Copy)]
pub struct GossipConfig {
    pub protocol_period_ms: u64,
    pub ack_timeout_ms: u64,
    pub dead_timeout_ms: u64,
    pub fanout: usize,
    pub max_piggyback: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            protocol_period_ms: 1000,
            ack_timeout_ms: 500,
            dead_timeout_ms: 5000,
            fanout: 3,
            max_piggyback: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GossipStats {
    pub pings_sent: u64,
    pub acks_received: u64,
    pub suspect_count: u64,
    pub dead_count: u64,
}

/// A destination for an outbound gossip datagram. `None` means "broadcast
/// to all non-dead peers" (§4.4: the engine iterates the view under the
/// read lock, captures destinations, releases the lock, then fans out).
pub type Destination = Option<(IpAddr, u16)>;

/// The capability set a gossip engine must provide (§9 REDESIGN FLAGS:
/// `{on_alive, on_suspect, on_dead, on_send}`).
pub trait GossipCallbacks {
    fn on_send_message(&mut self, msg: GossipMessage, dest: Destination);
    fn on_send_join_response(&mut self, msg: JoinResponse, dest: (IpAddr, u16));
    fn on_alive(&mut self, member: &Member);
    fn on_suspect(&mut self, member: &Member);
    fn on_dead(&mut self, member: &Member);
}

pub struct Protocol<C: GossipCallbacks> {
    local_id: u16,
    view: Arc<ClusterView>,
    queue: Arc<UpdateQueue>,
    callbacks: C,
    config: GossipConfig,
    pending_acks: HashMap<u16, u64>,
    sequence_num: u64,
    stats: GossipStats,
}

impl<C: GossipCallbacks> Protocol<C> {
    pub fn new(local_id: u16, view: Arc<ClusterView>, queue: Arc<UpdateQueue>, callbacks: C, config: GossipConfig) -> Self {
        Protocol {
            local_id,
            view,
            queue,
            callbacks,
            config,
            pending_acks: HashMap::new(),
            sequence_num: 0,
            stats: GossipStats::default(),
        }
    }

    pub fn stats(&self) -> GossipStats {
        self.stats.clone()
    }

    fn next_seq(&mut self) -> u64 {
        self.sequence_num += 1;
        self.sequence_num
    }

    fn self_member(&self, now_ms: u64) -> Option<MemberUpdate> {
        self.view.get(self.local_id).map(|m| MemberUpdate::from_member(&m, now_ms))
    }

    /// Draws up to `max_piggyback` updates: first whatever is queued from
    /// recent status changes, then a random backfill from the live view
    /// (excluding `exclude` and dead members).
    fn piggyback_updates(&self, exclude: u16, now_ms: u64) -> Vec<MemberUpdate> {
        let mut updates: Vec<MemberUpdate> = self
            .queue
            .drain_up_to(self.config.max_piggyback)
            .into_iter()
            .map(|m| MemberUpdate::from_member(&m, now_ms))
            .collect();

        if updates.len() < self.config.max_piggyback {
            let mut candidates: Vec<Member> = self
                .view
                .list_alive()
                .into_iter()
                .filter(|m| m.node_id != exclude)
                .collect();
            candidates.shuffle(&mut rand::thread_rng());
            for member in candidates {
                if updates.len() >= self.config.max_piggyback {
                    break;
                }
                if updates.iter().any(|u| u.node_id == member.node_id) {
                    continue;
                }
                updates.push(MemberUpdate::from_member(&member, now_ms));
            }
        }

        updates.truncate(self.config.max_piggyback);
        updates
    }

    /// §4.3 `run_swim_round`.
    pub fn run_swim_round(&mut self, now_ms: u64) {
        let peers = self.view.list_peers();
        if peers.is_empty() {
            return;
        }
        let target = peers.choose(&mut rand::thread_rng()).expect("non-empty peers").clone();

        let updates = self.piggyback_updates(target.node_id, now_ms);
        let msg = GossipMessage {
            msg_type: MsgType::Ping,
            sender_id: self.local_id,
            sequence_num: self.next_seq(),
            updates,
        };

        self.pending_acks.insert(target.node_id, now_ms);
        self.stats.pings_sent += 1;
        self.callbacks.on_send_message(msg, Some((target.ip, target.gossip_port)));
    }

    /// §4.3 `check_timeouts`.
    pub fn check_timeouts(&mut self, now_ms: u64) {
        let expired: Vec<u16> = self
            .pending_acks
            .iter()
            .filter(|&(_, &sent_at)| now_ms.saturating_sub(sent_at) > self.config.ack_timeout_ms)
            .map(|(&id, _)| id)
            .collect();

        for id in expired {
            self.pending_acks.remove(&id);
            let is_alive = self.view.get(id).map(|m| m.status == Status::Alive).unwrap_or(false);
            if !is_alive {
                continue;
            }
            let incarnation = self.view.get(id).map(|m| m.incarnation).unwrap_or(0);
            if self.view.update_status(id, Status::Suspect, incarnation) {
                self.stats.suspect_count += 1;
                if let Some(member) = self.view.get(id) {
                    let member = member.clone();
                    self.queue.push(member.clone());
                    self.callbacks.on_suspect(&member);
                }
            }
        }

        let suspects = self.view.dump();
        for member in suspects.into_iter().filter(|m| m.status == Status::Suspect) {
            if now_ms.saturating_sub(member.last_seen_ms) > self.config.dead_timeout_ms
                && self.view.update_status(member.node_id, Status::Dead, member.incarnation)
            {
                self.stats.dead_count += 1;
                if let Some(dead) = self.view.get(member.node_id) {
                    let dead = dead.clone();
                    self.queue.push(dead.clone());
                    self.callbacks.on_dead(&dead);
                }
            }
        }
    }

    /// §4.3 message handling dispatch.
    pub fn handle_message(&mut self, msg: GossipMessage, src: Destination, now_ms: u64) {
        if msg.sender_id == self.local_id {
            return;
        }
        self.view.touch(msg.sender_id, now_ms);

        match msg.msg_type {
            MsgType::Ping => {
                for update in &msg.updates {
                    self.merge_update(update.clone(), now_ms);
                }
                let ack = GossipMessage {
                    msg_type: MsgType::Ack,
                    sender_id: self.local_id,
                    sequence_num: self.next_seq(),
                    updates: self.piggyback_updates(msg.sender_id, now_ms),
                };
                self.callbacks.on_send_message(ack, src);
            }
            MsgType::Ack => {
                self.pending_acks.remove(&msg.sender_id);
                self.stats.acks_received += 1;
                let was_suspect = self.view.get(msg.sender_id).map(|m| m.status == Status::Suspect).unwrap_or(false);
                if was_suspect {
                    let incarnation = self.view.get(msg.sender_id).map(|m| m.incarnation).unwrap_or(0);
                    if self.view.update_status(msg.sender_id, Status::Alive, incarnation) {
                        if let Some(member) = self.view.get(msg.sender_id) {
                            let member = member.clone();
                            self.callbacks.on_alive(&member);
                        }
                    }
                }
                for update in &msg.updates {
                    self.merge_update(update.clone(), now_ms);
                }
            }
            MsgType::Suspect => {
                for update in &msg.updates {
                    if update.node_id == self.local_id && update.status == Status::Suspect && update.incarnation >= self.current_incarnation() {
                        self.refute(now_ms);
                    } else {
                        self.merge_update(update.clone(), now_ms);
                    }
                }
            }
            MsgType::Join | MsgType::WorkerJoin => {
                for update in &msg.updates {
                    self.merge_update(update.clone(), now_ms);
                }
                if self.view.get(self.local_id).map(|m| m.node_type).unwrap_or(NodeType::Worker) == NodeType::Router {
                    if let Some(dest) = src {
                        self.reply_join_response(dest, now_ms);
                    }
                }
            }
            MsgType::Alive | MsgType::Dead | MsgType::Leave => {
                for update in &msg.updates {
                    self.merge_update(update.clone(), now_ms);
                }
            }
            MsgType::JoinResponse => {
                // Handled separately via `handle_join_response` — a seed
                // never emits a plain GossipMessage with this type.
            }
        }
    }

    /// §6 "Bootstrap response": a seed router answers a JOIN with every
    /// router it currently knows about, itself included.
    fn reply_join_response(&mut self, dest: (IpAddr, u16), now_ms: u64) {
        let mut routers: Vec<RouterRecord> = self
            .view
            .list_by_type(NodeType::Router)
            .into_iter()
            .filter(|m| m.status != Status::Dead)
            .map(|m| RouterRecord {
                node_id: m.node_id,
                gossip_addr: std::net::SocketAddr::new(m.ip, m.gossip_port).to_string(),
                data_addr: std::net::SocketAddr::new(m.ip, m.data_port).to_string(),
            })
            .collect();
        if let Some(update) = self.self_member(now_ms) {
            if update.node_type == NodeType::Router && !routers.iter().any(|r| r.node_id == self.local_id) {
                routers.push(RouterRecord {
                    node_id: self.local_id,
                    gossip_addr: std::net::SocketAddr::new(update.ip, update.gossip_port).to_string(),
                    data_addr: std::net::SocketAddr::new(update.ip, update.data_port).to_string(),
                });
            }
        }
        let resp = JoinResponse { sender_id: self.local_id, sequence_num: self.next_seq(), routers };
        self.callbacks.on_send_join_response(resp, dest);
    }

    pub fn handle_join_response(&mut self, resp: JoinResponse, now_ms: u64) {
        for router in resp.routers {
            if let Ok(addr) = router.gossip_addr.parse::<std::net::SocketAddr>() {
                let update = MemberUpdate {
                    node_id: router.node_id,
                    node_type: NodeType::Router,
                    status: Status::Alive,
                    ip: addr.ip(),
                    gossip_port: addr.port(),
                    data_port: router
                        .data_addr
                        .parse::<std::net::SocketAddr>()
                        .map(|a| a.port())
                        .unwrap_or(0),
                    incarnation: 0,
                    timestamp_ms: now_ms,
                };
                self.merge_update(update, now_ms);
            }
        }
    }

    fn current_incarnation(&self) -> u64 {
        self.view.get(self.local_id).map(|m| m.incarnation).unwrap_or(0)
    }

    /// A SUSPECT about self: bump our incarnation and broadcast ALIVE.
    fn refute(&mut self, now_ms: u64) {
        let new_incarnation = self.current_incarnation() + 1;
        self.view.update_status(self.local_id, Status::Alive, new_incarnation);
        if let Some(update) = self.self_member(now_ms) {
            let msg = GossipMessage {
                msg_type: MsgType::Alive,
                sender_id: self.local_id,
                sequence_num: self.next_seq(),
                updates: vec![update],
            };
            self.callbacks.on_send_message(msg, None);
        }
    }

    /// §4.3 Merge Rule.
    fn merge_update(&mut self, update: MemberUpdate, now_ms: u64) {
        if update.node_id == self.local_id {
            return;
        }
        match self.view.get(update.node_id) {
            None => {
                let status = update.status;
                let member = Member { last_seen_ms: now_ms, ..update.into_member() };
                self.view.add(member.clone());
                self.fire_status_event(status, &member);
            }
            Some(existing) => {
                let existing = existing.clone();
                let revive = existing.status == Status::Dead
                    && update.status == Status::Alive
                    && update.incarnation > existing.incarnation;
                let newer = update.incarnation > existing.incarnation;
                let escalate = update.incarnation == existing.incarnation
                    && update.status.rank() > existing.status.rank();

                if revive || newer || escalate {
                    let applied = self.view.update_status(update.node_id, update.status, update.incarnation);
                    if applied {
                        if let Some(member) = self.view.get(update.node_id) {
                            let member = member.clone();
                            self.fire_status_event(update.status, &member);
                        }
                    }
                }
            }
        }
    }

    fn fire_status_event(&mut self, status: Status, member: &Member) {
        self.queue.push(member.clone());
        match status {
            Status::Alive => self.callbacks.on_alive(member),
            Status::Suspect => self.callbacks.on_suspect(member),
            Status::Dead => self.callbacks.on_dead(member),
        }
    }

    /// §4.3 `announce_join`: inserts self into the view as alive at the
    /// current incarnation.
    pub fn announce_join(&mut self, local: Member) {
        self.view.add(local);
    }

    /// §4.3 `announce_leave`: broadcasts a LEAVE carrying self marked dead.
    pub fn announce_leave(&mut self, now_ms: u64) {
        let incarnation = self.current_incarnation();
        self.view.update_status(self.local_id, Status::Dead, incarnation);
        if let Some(mut update) = self.self_member(now_ms) {
            update.status = Status::Dead;
            let msg = GossipMessage {
                msg_type: MsgType::Leave,
                sender_id: self.local_id,
                sequence_num: self.next_seq(),
                updates: vec![update],
            };
            self.callbacks.on_send_message(msg, None);
        }
    }

    /// §4.3 `add_seed`: sends a single JOIN carrying self to the seed.
    pub fn add_seed(&mut self, ip: IpAddr, port: u16, now_ms: u64) {
        if let Some(update) = self.self_member(now_ms) {
            let msg = GossipMessage {
                msg_type: MsgType::Join,
                sender_id: self.local_id,
                sequence_num: self.next_seq(),
                updates: vec![update],
            };
            self.callbacks.on_send_message(msg, Some((ip, port)));
        }
    }
}

#[cfg(test)]
mod tests;
