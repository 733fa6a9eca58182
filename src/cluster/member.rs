//! The member record (§3 "Member (cluster view entry)").

use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Router,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Alive,
    Suspect,
    Dead,
}

impl Status {
    /// The escalation order the Merge Rule uses for equal-incarnation
    /// updates: `alive -> suspect -> dead`, never the reverse.
    pub fn rank(self) -> u8 {
        match self {
            Status::Alive => 0,
            Status::Suspect => 1,
            Status::Dead => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub node_id: u16,
    pub node_type: NodeType,
    pub ip: IpAddr,
    pub gossip_port: u16,
    pub data_port: u16,
    pub status: Status,
    pub incarnation: u64,
    pub last_seen_ms: u64,
}

impl Member {
    pub fn new(
        node_id: u16,
        node_type: NodeType,
        ip: IpAddr,
        gossip_port: u16,
        data_port: u16,
    ) -> Self {
        Member {
            node_id,
            node_type,
            ip,
            gossip_port,
            data_port,
            status: Status::Alive,
            incarnation: 0,
            last_seen_ms: 0,
        }
    }
}
