//! A distributed cluster node: SWIM gossip membership and failure
//! detection over UDP, a Raft-backed replicated KV store over TCP, and
//! the binary RPC substrate that carries both (§1 OVERVIEW). [`Node`] is
//! the facade that wires gossip, RPC, and (on router nodes) Raft and the
//! KV store together into a running process.

pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod gossip;
pub mod kv;
pub mod raft_engine;
pub mod rpc;
pub mod time;
pub mod transport;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use storage::SharedKv;

use crate::cluster::member::{NodeType as MemberNodeType, Status};
use crate::cluster::{ClusterView, Member};
use crate::config::{ClusterConfig, NodeType as ConfigNodeType};
use crate::gossip::{ClusterEvent, GossipConfig, GossipEngine};
use crate::kv::Kv;
use crate::raft_engine::RaftEngine;
use crate::rpc::{HandlerRegistry, RpcServer};

/// A running cluster node. Every node runs gossip and the RPC server;
/// only routers (§3 "node_type ∈ {router, worker}") run a Raft engine and
/// expose the KV store, per §4.6.
pub struct Node {
    gossip: GossipEngine,
    rpc_server: RpcServer,
    raft: Option<Arc<RaftEngine>>,
    kv: Option<Kv>,
    view: Arc<ClusterView>,
    peer_sync: Option<thread::JoinHandle<()>>,
    peer_sync_shutdown: Arc<AtomicBool>,
}

impl Node {
    /// Binds the gossip and RPC sockets, announces self to the cluster
    /// (joining via `config.cluster_routers`'s first address, if any), and
    /// for routers starts the Raft engine rooted at `raft_log_dir`.
    pub fn start(config: &ClusterConfig, raft_log_dir: PathBuf) -> std::io::Result<Self> {
        let view = Arc::new(ClusterView::new(config.node_id));
        let node_type = member_node_type(config.node_type);

        let registry = Arc::new(HandlerRegistry::new());
        let rpc_server = RpcServer::start(config.data_addr, config.node_id, registry.clone())?;

        let gossip = GossipEngine::start(config.node_id, config.gossip_addr, view.clone(), GossipConfig::default())?;
        let local_member = Member::new(
            config.node_id,
            node_type,
            config.gossip_addr.ip(),
            config.gossip_addr.port(),
            config.data_addr.port(),
        );
        let seed = config.cluster_routers.first().map(|addr| (addr.ip(), addr.port()));
        gossip.join(local_member, seed);

        let peer_sync_shutdown = Arc::new(AtomicBool::new(false));
        let (raft, kv, peer_sync) = if node_type == MemberNodeType::Router {
            let shared_kv = SharedKv::new();
            let raft = Arc::new(RaftEngine::start(
                config.node_id,
                Vec::new(),
                &raft_log_dir,
                shared_kv.clone(),
                view.clone(),
                &registry,
                raft::Config::default(),
            )?);
            let kv = Kv::new(shared_kv, raft.clone(), config.node_id);
            let peer_sync = spawn_peer_sync(gossip.events(), raft.clone(), config.node_id, peer_sync_shutdown.clone());
            (Some(raft), Some(kv), Some(peer_sync))
        } else {
            (None, None, None)
        };

        Ok(Node {
            gossip,
            rpc_server,
            raft,
            kv,
            view,
            peer_sync,
            peer_sync_shutdown,
        })
    }

    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    pub fn kv(&self) -> Option<&Kv> {
        self.kv.as_ref()
    }

    pub fn raft(&self) -> Option<&Arc<RaftEngine>> {
        self.raft.as_ref()
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_server.local_addr()
    }

    pub fn gossip_addr(&self) -> std::io::Result<SocketAddr> {
        self.gossip.local_addr()
    }

    /// §4.3 `announce_leave`: broadcasts self as dead and stops gossiping.
    pub fn leave(&self) {
        self.gossip.leave();
    }

    pub fn stop(&mut self) {
        self.peer_sync_shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.peer_sync.take() {
            let _ = handle.join();
        }
        self.gossip.shutdown();
        self.rpc_server.stop();
        if let Some(raft) = self.raft.take() {
            match Arc::try_unwrap(raft) {
                Ok(mut raft) => raft.shutdown(),
                Err(raft) => drop(raft),
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

fn member_node_type(config_type: ConfigNodeType) -> MemberNodeType {
    match config_type {
        ConfigNodeType::Router => MemberNodeType::Router,
        ConfigNodeType::Worker => MemberNodeType::Worker,
    }
}

/// Keeps the Raft peer set in sync with router membership as gossip
/// observes joins and failures (§4.5: "Peer membership is manipulated at
/// runtime").
fn spawn_peer_sync(
    events: Receiver<ClusterEvent>,
    raft: Arc<RaftEngine>,
    local_id: u16,
    shutdown: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("raft-peer-sync".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match events.recv_timeout(Duration::from_millis(200)) {
                    Ok(ClusterEvent::Join(member)) if member.node_type == MemberNodeType::Router && member.node_id != local_id => {
                        raft.add_peer(member.node_id);
                    }
                    Ok(ClusterEvent::Failed(member)) if member.node_type == MemberNodeType::Router => {
                        raft.remove_peer(member.node_id);
                    }
                    Ok(ClusterEvent::Update(member)) if member.node_type == MemberNodeType::Router && member.status == Status::Dead => {
                        raft.remove_peer(member.node_id);
                    }
                    Ok(_) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("spawning the raft peer sync thread")
}
