//! The gossip wire format (§6): a 16-byte header followed by zero or more
//! 40-byte member updates, all big-endian.
//!
//! ```text
//! header: version(1) msg_type(1) flags(2) sender_id(2) sequence_num(8)
//!         num_updates(1) padding(1)                           = 16 bytes
//! update: node_id(2) node_type(1) status(1) ip_ascii(16)
//!         gossip_port(2) data_port(2) incarnation(8) timestamp_ms(8) = 40 bytes
//! ```

use std::net::IpAddr;

use crate::cluster::member::{NodeType, Status};
use crate::cluster::Member;
use crate::codec::{get_fixed_ascii, get_u16, get_u64, get_u8, need, put_fixed_ascii, put_u16, put_u64, put_u8, CodecError};

pub const HEADER_LEN: usize = 16;
pub const UPDATE_LEN: usize = 40;
pub const GOSSIP_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Ping = 1,
    Ack = 2,
    Suspect = 3,
    Alive = 4,
    Dead = 5,
    Join = 6,
    Leave = 7,
    WorkerJoin = 8,
    JoinResponse = 9,
}

impl MsgType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(MsgType::Ping),
            2 => Some(MsgType::Ack),
            3 => Some(MsgType::Suspect),
            4 => Some(MsgType::Alive),
            5 => Some(MsgType::Dead),
            6 => Some(MsgType::Join),
            7 => Some(MsgType::Leave),
            8 => Some(MsgType::WorkerJoin),
            9 => Some(MsgType::JoinResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpdate {
    pub node_id: u16,
    pub node_type: NodeType,
    pub status: Status,
    pub ip: IpAddr,
    pub gossip_port: u16,
    pub data_port: u16,
    pub incarnation: u64,
    pub timestamp_ms: u64,
}

impl MemberUpdate {
    pub fn from_member(member: &Member, now_ms: u64) -> Self {
        MemberUpdate {
            node_id: member.node_id,
            node_type: member.node_type,
            status: member.status,
            ip: member.ip,
            gossip_port: member.gossip_port,
            data_port: member.data_port,
            incarnation: member.incarnation,
            timestamp_ms: now_ms,
        }
    }

    pub fn into_member(self) -> Member {
        Member {
            node_id: self.node_id,
            node_type: self.node_type,
            ip: self.ip,
            gossip_port: self.gossip_port,
            data_port: self.data_port,
            status: self.status,
            incarnation: self.incarnation,
            last_seen_ms: self.timestamp_ms,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.node_id);
        put_u8(out, node_type_byte(self.node_type));
        put_u8(out, status_byte(self.status));
        put_fixed_ascii(out, &self.ip.to_string(), 16);
        put_u16(out, self.gossip_port);
        put_u16(out, self.data_port);
        put_u64(out, self.incarnation);
        put_u64(out, self.timestamp_ms);
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        need(buf, UPDATE_LEN)?;
        let node_id = get_u16(buf, 0);
        let node_type = node_type_from_byte(get_u8(buf, 2));
        let status = status_from_byte(get_u8(buf, 3));
        let ip: IpAddr = get_fixed_ascii(buf, 4, 16)
            .parse()
            .map_err(|_| CodecError::Truncated { need: UPDATE_LEN, have: buf.len() })?;
        let gossip_port = get_u16(buf, 20);
        let data_port = get_u16(buf, 22);
        let incarnation = get_u64(buf, 24);
        let timestamp_ms = get_u64(buf, 32);
        Ok(MemberUpdate { node_id, node_type, status, ip, gossip_port, data_port, incarnation, timestamp_ms })
    }
}

fn node_type_byte(t: NodeType) -> u8 {
    match t {
        NodeType::Router => 0,
        NodeType::Worker => 1,
    }
}

fn node_type_from_byte(b: u8) -> NodeType {
    match b {
        0 => NodeType::Router,
        _ => NodeType::Worker,
    }
}

fn status_byte(s: Status) -> u8 {
    match s {
        Status::Alive => 0,
        Status::Suspect => 1,
        Status::Dead => 2,
    }
}

fn status_from_byte(b: u8) -> Status {
    match b {
        0 => Status::Alive,
        1 => Status::Suspect,
        _ => Status::Dead,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub msg_type: MsgType,
    pub sender_id: u16,
    pub sequence_num: u64,
    pub updates: Vec<MemberUpdate>,
}

/// The outcome of decoding a possibly-truncated datagram (§8 boundary
/// behavior: "accepted up to the last whole update; counters reflect the
/// truncation").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGossip {
    pub message: GossipMessage,
    pub truncated_updates: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GossipDecodeError {
    #[error("unsupported gossip version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown gossip message type {0}")]
    UnknownMsgType(u8),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl GossipMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.updates.len() * UPDATE_LEN);
        put_u8(&mut out, GOSSIP_VERSION);
        put_u8(&mut out, self.msg_type as u8);
        put_u16(&mut out, 0); // flags, reserved
        put_u16(&mut out, self.sender_id);
        put_u64(&mut out, self.sequence_num);
        put_u8(&mut out, self.updates.len().min(u8::MAX as usize) as u8);
        put_u8(&mut out, 0); // padding
        for update in &self.updates {
            update.encode(&mut out);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<DecodedGossip, GossipDecodeError> {
        need(buf, HEADER_LEN)?;
        let version = get_u8(buf, 0);
        if version != GOSSIP_VERSION {
            return Err(GossipDecodeError::UnsupportedVersion(version));
        }
        let msg_type = MsgType::from_u8(get_u8(buf, 1)).ok_or(GossipDecodeError::UnknownMsgType(get_u8(buf, 1)))?;
        let sender_id = get_u16(buf, 4);
        let sequence_num = get_u64(buf, 6);
        let declared_updates = get_u8(buf, 14) as usize;

        let mut updates = Vec::with_capacity(declared_updates);
        let mut pos = HEADER_LEN;
        let mut truncated = 0;
        for _ in 0..declared_updates {
            if buf.len() < pos + UPDATE_LEN {
                truncated += 1;
                continue;
            }
            updates.push(MemberUpdate::decode(&buf[pos..pos + UPDATE_LEN])?);
            pos += UPDATE_LEN;
        }

        Ok(DecodedGossip {
            message: GossipMessage { msg_type, sender_id, sequence_num, updates },
            truncated_updates: truncated,
        })
    }
}

/// Additive JOIN_RESPONSE wiring (see `SPEC_FULL.md` §4.3 / `DESIGN.md`):
/// the seed's reply to a JOIN, carrying its known routers for bootstrap.
/// Reuses the gossip header (with `num_updates` left at 0) followed
/// directly by the bootstrap-response body from §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRecord {
    pub node_id: u16,
    pub gossip_addr: String,
    pub data_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResponse {
    pub sender_id: u16,
    pub sequence_num: u64,
    pub routers: Vec<RouterRecord>,
}

impl JoinResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 1 + self.routers.len() * 130);
        put_u8(&mut out, GOSSIP_VERSION);
        put_u8(&mut out, MsgType::JoinResponse as u8);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.sender_id);
        put_u64(&mut out, self.sequence_num);
        put_u8(&mut out, 0);
        put_u8(&mut out, 0);
        put_u8(&mut out, self.routers.len().min(u8::MAX as usize) as u8);
        for router in &self.routers {
            put_u16(&mut out, router.node_id);
            put_fixed_ascii(&mut out, &router.gossip_addr, 64);
            put_fixed_ascii(&mut out, &router.data_addr, 64);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, GossipDecodeError> {
        need(buf, HEADER_LEN)?;
        let version = get_u8(buf, 0);
        if version != GOSSIP_VERSION {
            return Err(GossipDecodeError::UnsupportedVersion(version));
        }
        let msg_type = MsgType::from_u8(get_u8(buf, 1)).ok_or(GossipDecodeError::UnknownMsgType(get_u8(buf, 1)))?;
        if msg_type != MsgType::JoinResponse {
            return Err(GossipDecodeError::UnknownMsgType(get_u8(buf, 1)));
        }
        let sender_id = get_u16(buf, 4);
        let sequence_num = get_u64(buf, 6);
        need(buf, HEADER_LEN + 1)?;
        let num_routers = get_u8(buf, HEADER_LEN) as usize;

        let mut routers = Vec::with_capacity(num_routers);
        let mut pos = HEADER_LEN + 1;
        for _ in 0..num_routers {
            need(buf, pos + 130)?;
            let node_id = get_u16(buf, pos);
            let gossip_addr = get_fixed_ascii(buf, pos + 2, 64);
            let data_addr = get_fixed_ascii(buf, pos + 66, 64);
            routers.push(RouterRecord { node_id, gossip_addr, data_addr });
            pos += 130;
        }

        Ok(JoinResponse { sender_id, sequence_num, routers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_with_no_updates_is_exactly_16_bytes_and_starts_0x01_0x01() {
        let msg = GossipMessage { msg_type: MsgType::Ping, sender_id: 42, sequence_num: 12345, updates: vec![] };
        let encoded = msg.encode();
        assert_eq!(encoded.len(), 16);
        assert_eq!(&encoded[0..2], &[0x01, 0x01]);
    }

    #[test]
    fn round_trips_with_updates() {
        let update = MemberUpdate {
            node_id: 7,
            node_type: NodeType::Worker,
            status: Status::Alive,
            ip: "10.0.0.5".parse().unwrap(),
            gossip_port: 10001,
            data_port: 20001,
            incarnation: 3,
            timestamp_ms: 99,
        };
        let msg = GossipMessage { msg_type: MsgType::Ack, sender_id: 1, sequence_num: 2, updates: vec![update.clone()] };
        let encoded = msg.encode();
        assert_eq!(encoded.len(), HEADER_LEN + UPDATE_LEN);
        let decoded = GossipMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.truncated_updates, 0);
        assert_eq!(decoded.message, msg);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = 2;
        assert_eq!(GossipMessage::decode(&buf).unwrap_err(), GossipDecodeError::UnsupportedVersion(2));
    }

    #[test]
    fn accepts_truncated_trailing_update() {
        let update = MemberUpdate {
            node_id: 1,
            node_type: NodeType::Router,
            status: Status::Alive,
            ip: "127.0.0.1".parse().unwrap(),
            gossip_port: 1,
            data_port: 2,
            incarnation: 0,
            timestamp_ms: 0,
        };
        let msg = GossipMessage { msg_type: MsgType::Ping, sender_id: 1, sequence_num: 1, updates: vec![update.clone(), update] };
        let mut encoded = msg.encode();
        encoded.truncate(HEADER_LEN + UPDATE_LEN + 10); // cut the second update short
        let decoded = GossipMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.message.updates.len(), 1);
        assert_eq!(decoded.truncated_updates, 1);
    }

    #[test]
    fn join_response_round_trips() {
        let resp = JoinResponse {
            sender_id: 1,
            sequence_num: 1,
            routers: vec![RouterRecord {
                node_id: 1,
                gossip_addr: "127.0.0.1:10001".to_string(),
                data_addr: "127.0.0.1:20001".to_string(),
            }],
        };
        let encoded = resp.encode();
        assert_eq!(JoinResponse::decode(&encoded).unwrap(), resp);
    }
}
