//! The Raft engine (§4.5): binds the pure [`raft::RaftCore`] state machine
//! to real timers, the RPC substrate, and the cluster view used to resolve
//! peer addresses. Plays the same role for Raft that [`crate::gossip::engine`]
//! plays for SWIM.
//!
//! Three threads drive `RaftCore` forward, matching §4.5's thread budget:
//! an election timer (10ms), a heartbeat/replication timer
//! (`heartbeat_interval_ms`), and an apply loop (10ms). Outbound RPCs are
//! dispatched on the rayon pool so a slow peer never blocks a timer tick.

pub mod wire_handlers;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use raft::log::file::FileLog;
use raft::message::NodeId;
use raft::wire::{AppendEntriesResponse, InstallSnapshotResponse, RequestVoteResponse};
use raft::{Config as RaftConfig, NotLeaderError, Outbound, RaftCore, Stats};
use storage::SharedKv;

use crate::cluster::ClusterView;
use crate::rpc::{function_id, Client, HandlerRegistry};

pub type NodeCore = RaftCore<FileLog, SharedKv>;

const ELECTION_TICK_MS: u64 = 10;
const APPLY_TICK_MS: u64 = 10;
const RPC_TIMEOUT: Duration = Duration::from_millis(300);

fn peer_addr(view: &ClusterView, peer: NodeId) -> Option<SocketAddr> {
    view.get(peer).map(|m| SocketAddr::new(m.ip, m.data_port))
}

/// Owns the three Raft timer threads plus the shared, lockable `RaftCore`.
pub struct RaftEngine {
    shutdown: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
    core: Arc<Mutex<NodeCore>>,
}

impl RaftEngine {
    /// Opens (or creates) the durable log under `log_dir`, wires up the
    /// three timer threads, and registers the RPC handlers on `registry`.
    pub fn start(
        local_id: NodeId,
        peers: Vec<NodeId>,
        log_dir: &Path,
        kv: SharedKv,
        view: Arc<ClusterView>,
        registry: &HandlerRegistry,
        raft_config: RaftConfig,
    ) -> std::io::Result<Self> {
        let log = FileLog::open(log_dir).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{}", e)))?;
        let core = Arc::new(Mutex::new(RaftCore::new(local_id, peers, log, kv, raft_config)));

        wire_handlers::register(registry, core.clone());

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(3);

        handles.push(spawn_election_thread(core.clone(), view.clone(), local_id, shutdown.clone()));
        handles.push(spawn_heartbeat_thread(core.clone(), view.clone(), local_id, raft_config.heartbeat_interval_ms, shutdown.clone()));
        handles.push(spawn_apply_thread(core.clone(), shutdown.clone()));

        Ok(RaftEngine { shutdown, handles, core })
    }

    pub fn stats(&self) -> Stats {
        self.core.lock().expect("raft core lock poisoned").stats()
    }

    pub fn is_leader(&self) -> bool {
        self.core.lock().expect("raft core lock poisoned").is_leader()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.core.lock().expect("raft core lock poisoned").leader_id()
    }

    /// §4.5 "Peer membership is manipulated at runtime": the node program
    /// calls these as gossip observes routers joining or failing.
    pub fn add_peer(&self, peer: NodeId) {
        self.core.lock().expect("raft core lock poisoned").add_peer(peer);
    }

    pub fn remove_peer(&self, peer: NodeId) {
        self.core.lock().expect("raft core lock poisoned").remove_peer(peer);
    }

    /// Submits a client command through Raft (§4.6 write path). Returns the
    /// `(index, term)` the caller should pass to `SharedKv::wait_applied`.
    pub fn submit(&self, data: Vec<u8>, client_id: u16, now_ms: u64) -> Result<(u64, u64), NotLeaderError> {
        self.core.lock().expect("raft core lock poisoned").submit_command(data, client_id, now_ms)
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for RaftEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(core: Arc<Mutex<NodeCore>>, view: Arc<ClusterView>, local_id: NodeId, out: Vec<(NodeId, Outbound)>) {
    for (peer, outbound) in out {
        let addr = match peer_addr(&view, peer) {
            Some(addr) => addr,
            None => {
                log::warn!("no known address for raft peer {}", peer);
                continue;
            }
        };
        let core = core.clone();
        rayon::spawn(move || send_one(core, local_id, peer, addr, outbound));
    }
}

fn send_one(core: Arc<Mutex<NodeCore>>, local_id: NodeId, peer: NodeId, addr: SocketAddr, outbound: Outbound) {
    match outbound {
        Outbound::RequestVote(req) => {
            match Client::call(addr, local_id, function_id::RAFT_REQUEST_VOTE, &req.encode(), RPC_TIMEOUT) {
                Ok((_, payload)) => match RequestVoteResponse::decode(&payload) {
                    Ok(resp) => {
                        let now = crate::time::now_ms();
                        core.lock().expect("raft core lock poisoned").handle_request_vote_response(peer, &resp, now);
                    }
                    Err(e) => log::warn!("malformed RequestVote response from {}: {}", peer, e),
                },
                Err(e) => log::debug!("RequestVote to {} ({}) failed: {}", peer, addr, e),
            }
        }
        Outbound::AppendEntries(req) => {
            match Client::call(addr, local_id, function_id::RAFT_APPEND_ENTRIES, &req.encode(), RPC_TIMEOUT) {
                Ok((_, payload)) => match AppendEntriesResponse::decode(&payload) {
                    Ok(resp) => {
                        core.lock().expect("raft core lock poisoned").handle_append_entries_response(peer, &resp);
                    }
                    Err(e) => log::warn!("malformed AppendEntries response from {}: {}", peer, e),
                },
                Err(e) => log::debug!("AppendEntries to {} ({}) failed: {}", peer, addr, e),
            }
        }
        Outbound::InstallSnapshot(req) => {
            match Client::call(addr, local_id, function_id::RAFT_INSTALL_SNAPSHOT, &req.encode(), RPC_TIMEOUT) {
                Ok((_, payload)) => match InstallSnapshotResponse::decode(&payload) {
                    Ok(resp) => {
                        core.lock().expect("raft core lock poisoned").handle_install_snapshot_response(&resp);
                    }
                    Err(e) => log::warn!("malformed InstallSnapshot response from {}: {}", peer, e),
                },
                Err(e) => log::debug!("InstallSnapshot to {} ({}) failed: {}", peer, addr, e),
            }
        }
    }
}

fn spawn_election_thread(core: Arc<Mutex<NodeCore>>, view: Arc<ClusterView>, local_id: NodeId, shutdown: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("raft-election".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(ELECTION_TICK_MS));
                let now = crate::time::now_ms();
                let out = core.lock().expect("raft core lock poisoned").tick_election(ELECTION_TICK_MS, now);
                if !out.is_empty() {
                    dispatch(core.clone(), view.clone(), local_id, out);
                }
            }
        })
        .expect("spawning the raft election thread")
}

fn spawn_heartbeat_thread(
    core: Arc<Mutex<NodeCore>>,
    view: Arc<ClusterView>,
    local_id: NodeId,
    heartbeat_interval_ms: u64,
    shutdown: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("raft-heartbeat".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(heartbeat_interval_ms));
                let out = core.lock().expect("raft core lock poisoned").tick_heartbeat(heartbeat_interval_ms);
                if !out.is_empty() {
                    dispatch(core.clone(), view.clone(), local_id, out);
                }
            }
        })
        .expect("spawning the raft heartbeat thread")
}

fn spawn_apply_thread(core: Arc<Mutex<NodeCore>>, shutdown: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("raft-apply".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(APPLY_TICK_MS));
                let applied = core.lock().expect("raft core lock poisoned").tick_apply();
                if applied > 0 {
                    log::trace!("raft apply thread applied {} entr{}", applied, if applied == 1 { "y" } else { "ies" });
                }
            }
        })
        .expect("spawning the raft apply thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::member::{NodeType, Status};
    use crate::cluster::Member;
    use crate::rpc::RpcServer;
    use serial_test::serial;
    use std::time::Duration as StdDuration;

    fn member(id: NodeId, addr: SocketAddr) -> Member {
        Member {
            node_id: id,
            node_type: NodeType::Router,
            ip: addr.ip(),
            gossip_port: addr.port(),
            data_port: addr.port(),
            status: Status::Alive,
            incarnation: 0,
            last_seen_ms: 0,
        }
    }

    #[test]
    #[serial]
    fn single_node_cluster_elects_itself_leader() {
        let dir = std::env::temp_dir().join(format!("raft-engine-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let view = Arc::new(ClusterView::new(1));
        let registry = Arc::new(HandlerRegistry::new());
        let mut server = RpcServer::start("127.0.0.1:0".parse().unwrap(), 1, registry.clone()).unwrap();
        let addr = server.local_addr();
        view.add(member(1, addr));

        let mut engine = RaftEngine::start(
            1,
            vec![],
            &dir,
            SharedKv::new(),
            view,
            &registry,
            RaftConfig {
                election_timeout_min_ms: 20,
                election_timeout_max_ms: 30,
                heartbeat_interval_ms: 10,
                max_entries_per_append: 64,
            },
        )
        .unwrap();

        std::thread::sleep(StdDuration::from_millis(150));
        assert!(engine.is_leader());

        engine.shutdown();
        server.stop();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
