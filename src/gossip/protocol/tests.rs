use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use crate::cluster::member::{NodeType, Status};
use crate::cluster::update_queue::UpdateQueue;
use crate::cluster::{ClusterView, Member};
use crate::gossip::message::{GossipMessage, JoinResponse, MsgType};
use crate::gossip::protocol::{Destination, GossipCallbacks, GossipConfig, Protocol};

#[derive(Default)]
struct RecordingCallbacks {
    sent: Vec<(GossipMessage, Destination)>,
    alive: Vec<u16>,
    suspect: Vec<u16>,
    dead: Vec<u16>,
}

impl GossipCallbacks for RecordingCallbacks {
    fn on_send_message(&mut self, msg: GossipMessage, dest: Destination) {
        self.sent.push((msg, dest));
    }
    fn on_send_join_response(&mut self, _msg: JoinResponse, _dest: (IpAddr, u16)) {}
    fn on_alive(&mut self, member: &Member) {
        self.alive.push(member.node_id);
    }
    fn on_suspect(&mut self, member: &Member) {
        self.suspect.push(member.node_id);
    }
    fn on_dead(&mut self, member: &Member) {
        self.dead.push(member.node_id);
    }
}

fn member(id: u16, status: Status, incarnation: u64, last_seen_ms: u64) -> Member {
    Member {
        node_id: id,
        node_type: NodeType::Worker,
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        gossip_port: 10000 + id,
        data_port: 20000 + id,
        status,
        incarnation,
        last_seen_ms,
    }
}

fn setup(local_id: u16) -> (Arc<ClusterView>, Arc<UpdateQueue>) {
    (Arc::new(ClusterView::new(local_id)), Arc::new(UpdateQueue::new(64)))
}

#[test]
fn run_swim_round_pings_a_random_peer_and_records_pending_ack() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    view.add(member(2, Status::Alive, 0, 0));
    let mut proto = Protocol::new(1, view, queue, RecordingCallbacks::default(), GossipConfig::default());

    proto.run_swim_round(1000);
    assert_eq!(proto.callbacks.sent.len(), 1);
    let (msg, dest) = &proto.callbacks.sent[0];
    assert_eq!(msg.msg_type, MsgType::Ping);
    assert!(dest.is_some());
    assert_eq!(proto.stats().pings_sent, 1);
}

#[test]
fn ack_timeout_transitions_target_to_suspect() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    view.add(member(2, Status::Alive, 0, 0));
    let mut proto = Protocol::new(1, view.clone(), queue, RecordingCallbacks::default(), GossipConfig::default());

    proto.run_swim_round(1000);
    proto.check_timeouts(1000 + GossipConfig::default().ack_timeout_ms + 1);

    assert_eq!(view.get(2).unwrap().status, Status::Suspect);
    assert_eq!(proto.callbacks.suspect_count_calls(), 1);
}

impl RecordingCallbacks {
    fn suspect_count_calls(&self) -> usize {
        self.suspect.len()
    }
}

#[test]
fn suspect_then_dead_timeout_escalation() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    view.add(member(2, Status::Suspect, 0, 0));
    let mut proto = Protocol::new(1, view.clone(), queue, RecordingCallbacks::default(), GossipConfig::default());

    proto.check_timeouts(GossipConfig::default().dead_timeout_ms + 1);
    assert_eq!(view.get(2).unwrap().status, Status::Dead);
    assert_eq!(proto.callbacks.dead.len(), 1);
}

#[test]
fn ping_merges_piggybacked_updates_and_replies_with_ack() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    let mut proto = Protocol::new(1, view.clone(), queue, RecordingCallbacks::default(), GossipConfig::default());

    let incoming = GossipMessage {
        msg_type: MsgType::Ping,
        sender_id: 2,
        sequence_num: 1,
        updates: vec![crate::gossip::message::MemberUpdate {
            node_id: 3,
            node_type: NodeType::Worker,
            status: Status::Alive,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gossip_port: 10003,
            data_port: 20003,
            incarnation: 0,
            timestamp_ms: 500,
        }],
    };
    proto.handle_message(incoming, Some((IpAddr::V4(Ipv4Addr::LOCALHOST), 10002)), 1000);

    assert!(view.contains(3));
    assert_eq!(proto.callbacks.sent.len(), 1);
    assert_eq!(proto.callbacks.sent[0].0.msg_type, MsgType::Ack);
}

#[test]
fn suspect_about_self_triggers_refutation() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    let mut proto = Protocol::new(1, view.clone(), queue, RecordingCallbacks::default(), GossipConfig::default());

    let suspect_msg = GossipMessage {
        msg_type: MsgType::Suspect,
        sender_id: 2,
        sequence_num: 1,
        updates: vec![crate::gossip::message::MemberUpdate {
            node_id: 1,
            node_type: NodeType::Worker,
            status: Status::Suspect,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gossip_port: 10001,
            data_port: 20001,
            incarnation: 0,
            timestamp_ms: 500,
        }],
    };
    proto.handle_message(suspect_msg, None, 1000);

    assert_eq!(view.get(1).unwrap().status, Status::Alive);
    assert_eq!(view.get(1).unwrap().incarnation, 1);
    let broadcast = proto.callbacks.sent.iter().find(|(m, d)| m.msg_type == MsgType::Alive && d.is_none());
    assert!(broadcast.is_some());
}

#[test]
fn dead_to_alive_revival_requires_higher_incarnation() {
    let (view, queue) = setup(1);
    view.add(member(1, Status::Alive, 0, 0));
    view.add(member(2, Status::Dead, 5, 0));
    let mut proto = Protocol::new(1, view.clone(), queue, RecordingCallbacks::default(), GossipConfig::default());

    let stale = crate::gossip::message::MemberUpdate {
        node_id: 2,
        node_type: NodeType::Worker,
        status: Status::Alive,
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        gossip_port: 10002,
        data_port: 20002,
        incarnation: 5,
        timestamp_ms: 1000,
    };
    let msg = GossipMessage { msg_type: MsgType::Alive, sender_id: 3, sequence_num: 1, updates: vec![stale] };
    proto.handle_message(msg, None, 1000);
    assert_eq!(view.get(2).unwrap().status, Status::Dead);

    let fresh = crate::gossip::message::MemberUpdate {
        node_id: 2,
        node_type: NodeType::Worker,
        status: Status::Alive,
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        gossip_port: 10002,
        data_port: 20002,
        incarnation: 6,
        timestamp_ms: 1000,
    };
    let msg2 = GossipMessage { msg_type: MsgType::Alive, sender_id: 3, sequence_num: 2, updates: vec![fresh] };
    proto.handle_message(msg2, None, 1000);
    assert_eq!(view.get(2).unwrap().status, Status::Alive);
}
