//! The gossip engine (§4.4): glues the datagram transport, the pure
//! protocol state machine, and the cluster view. A receive thread (inside
//! [`DatagramTransport`]) hands raw datagrams to a dispatch thread that
//! decodes and drives the protocol; a separate tick thread calls
//! `run_swim_round`/`check_timeouts` on a fixed period. Protocol events
//! are fanned out over an [`MPB`] broadcast channel.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use mpb::MPB;

use crate::cluster::update_queue::UpdateQueue;
use crate::cluster::{ClusterView, Member};
use crate::gossip::message::{GossipMessage, JoinResponse};
use crate::gossip::protocol::{Destination, GossipCallbacks, GossipConfig, Protocol};
use crate::transport::datagram::DatagramTransport;

/// Application-visible membership events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Join(Member),
    Leave(Member),
    Failed(Member),
    Update(Member),
}

struct EngineCallbacks {
    transport: Arc<DatagramTransport>,
    view: Arc<ClusterView>,
    local_id: u16,
    events: Arc<MPB<ClusterEvent>>,
}

impl EngineCallbacks {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) {
        if let Err(e) = self.transport.send(buf, dest) {
            log::warn!("gossip send error to {}: {}", dest, e);
        }
    }

    /// Broadcasts to every non-dead peer. The destination list is read out
    /// of the view (each call takes and releases the read lock internally)
    /// before any socket I/O happens.
    fn broadcast(&self, buf: &[u8]) {
        for peer in self.view.list_peers() {
            if peer.node_id == self.local_id {
                continue;
            }
            self.send_to(buf, SocketAddr::new(peer.ip, peer.gossip_port));
        }
    }
}

impl GossipCallbacks for EngineCallbacks {
    fn on_send_message(&mut self, msg: GossipMessage, dest: Destination) {
        let buf = msg.encode();
        match dest {
            Some((ip, port)) => self.send_to(&buf, SocketAddr::new(ip, port)),
            None => self.broadcast(&buf),
        }
    }

    fn on_send_join_response(&mut self, msg: JoinResponse, dest: (IpAddr, u16)) {
        let buf = msg.encode();
        self.send_to(&buf, SocketAddr::new(dest.0, dest.1));
    }

    fn on_alive(&mut self, member: &Member) {
        let _ = self.events.sender().send(ClusterEvent::Join(member.clone()));
    }

    fn on_suspect(&mut self, member: &Member) {
        let _ = self.events.sender().send(ClusterEvent::Update(member.clone()));
    }

    fn on_dead(&mut self, member: &Member) {
        let _ = self.events.sender().send(ClusterEvent::Failed(member.clone()));
    }
}

/// Owns the receive/dispatch/tick threads and exposes the event bus and
/// cluster view to the rest of the node.
pub struct GossipEngine {
    shutdown: Arc<AtomicBool>,
    dispatch_handle: Option<thread::JoinHandle<()>>,
    tick_handle: Option<thread::JoinHandle<()>>,
    transport: Arc<DatagramTransport>,
    events: Arc<MPB<ClusterEvent>>,
    view: Arc<ClusterView>,
    protocol: Arc<Mutex<Protocol<EngineCallbacks>>>,
    datagram_tx: Sender<DatagramDone>,
}

/// Sentinel sent through the dispatch channel to unblock it on shutdown.
enum DatagramDone {
    Received(Vec<u8>, SocketAddr),
    Stop,
}

impl GossipEngine {
    pub fn start(
        local_id: u16,
        bind_addr: SocketAddr,
        view: Arc<ClusterView>,
        config: GossipConfig,
    ) -> std::io::Result<Self> {
        let mut transport = DatagramTransport::bind(bind_addr)?;
        let (datagram_tx, datagram_rx) = unbounded::<DatagramDone>();

        let forward_tx = datagram_tx.clone();
        transport.start_receiving(move |buf, src| {
            let _ = forward_tx.send(DatagramDone::Received(buf.to_vec(), src));
        });

        let transport = Arc::new(transport);
        let events = Arc::new(MPB::new());
        let queue = Arc::new(UpdateQueue::new(256));
        let callbacks = EngineCallbacks {
            transport: transport.clone(),
            view: view.clone(),
            local_id,
            events: events.clone(),
        };
        let protocol = Arc::new(Mutex::new(Protocol::new(local_id, view.clone(), queue, callbacks, config)));

        let dispatch_protocol = protocol.clone();
        let dispatch_handle = thread::Builder::new()
            .name("gossip-dispatch".to_string())
            .spawn(move || {
                for item in datagram_rx {
                    let (buf, src) = match item {
                        DatagramDone::Received(buf, src) => (buf, src),
                        DatagramDone::Stop => break,
                    };
                    dispatch_datagram(&dispatch_protocol, &buf, src);
                }
            })
            .expect("spawning the gossip dispatch thread");

        let shutdown = Arc::new(AtomicBool::new(false));
        let tick_shutdown = shutdown.clone();
        let tick_protocol = protocol.clone();
        let tick_period = config.protocol_period_ms;
        let tick_handle = thread::Builder::new()
            .name("gossip-tick".to_string())
            .spawn(move || {
                let mut round: u64 = 0;
                while !tick_shutdown.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(tick_period));
                    let now = crate::time::now_ms();
                    let mut proto = tick_protocol.lock().expect("gossip protocol lock poisoned");
                    proto.run_swim_round(now);
                    proto.check_timeouts(now);
                    round += 1;
                    if round % 10 == 0 {
                        log::info!("gossip round {}: {:?}", round, proto.stats());
                    }
                }
            })
            .expect("spawning the gossip protocol tick thread");

        Ok(GossipEngine {
            shutdown,
            dispatch_handle: Some(dispatch_handle),
            tick_handle: Some(tick_handle),
            transport,
            events,
            view,
            protocol,
            datagram_tx,
        })
    }

    pub fn events(&self) -> Receiver<ClusterEvent> {
        self.events.receiver()
    }

    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// §4.3 `announce_join`: registers self in the view and, if `seed` is
    /// given, sends it a JOIN.
    pub fn join(&self, local: Member, seed: Option<(IpAddr, u16)>) {
        let mut proto = self.protocol.lock().expect("gossip protocol lock poisoned");
        proto.announce_join(local);
        if let Some((ip, port)) = seed {
            proto.add_seed(ip, port, crate::time::now_ms());
        }
    }

    pub fn leave(&self) {
        let mut proto = self.protocol.lock().expect("gossip protocol lock poisoned");
        proto.announce_leave(crate::time::now_ms());
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.datagram_tx.send(DatagramDone::Stop);
        if let Some(handle) = self.tick_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatch_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GossipEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `GossipMessage` and `JoinResponse` share a 16-byte header but diverge
/// after it; byte 1 (`msg_type`) disambiguates which decoder to use before
/// either is attempted, since both would otherwise parse headers of the
/// other's wire form without erroring.
const MSG_TYPE_OFFSET: usize = 1;

fn dispatch_datagram(protocol: &Arc<Mutex<Protocol<EngineCallbacks>>>, buf: &[u8], src: SocketAddr) {
    let now = crate::time::now_ms();
    if buf.get(MSG_TYPE_OFFSET) == Some(&(crate::gossip::message::MsgType::JoinResponse as u8)) {
        match JoinResponse::decode(buf) {
            Ok(resp) => {
                let mut proto = protocol.lock().expect("gossip protocol lock poisoned");
                proto.handle_join_response(resp, now);
            }
            Err(e) => log::warn!("malformed join response from {}: {}", src, e),
        }
        return;
    }

    match GossipMessage::decode(buf) {
        Ok(decoded) => {
            if decoded.truncated_updates > 0 {
                log::warn!("gossip datagram from {} truncated {} update(s)", src, decoded.truncated_updates);
            }
            let mut proto = protocol.lock().expect("gossip protocol lock poisoned");
            proto.handle_message(decoded.message, Some((src.ip(), src.port())), now);
        }
        Err(e) => log::warn!("discarding malformed gossip datagram from {}: {}", src, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::member::{NodeType, Status};
    use serial_test::serial;
    use std::time::Duration as StdDuration;

    fn cfg() -> GossipConfig {
        GossipConfig { protocol_period_ms: 50, ..GossipConfig::default() }
    }

    /// Sleep-timed against real wall clock rounds; run serially so a busy
    /// test binary doesn't starve the tick thread past the convergence window.
    #[test]
    #[serial]
    fn two_engines_discover_each_other_via_a_join() {
        let view_a = Arc::new(ClusterView::new(1));
        let view_b = Arc::new(ClusterView::new(2));

        let mut engine_a = GossipEngine::start(1, "127.0.0.1:0".parse().unwrap(), view_a.clone(), cfg()).unwrap();
        let mut engine_b = GossipEngine::start(2, "127.0.0.1:0".parse().unwrap(), view_b.clone(), cfg()).unwrap();

        let addr_a = engine_a.local_addr().unwrap();
        let addr_b = engine_b.local_addr().unwrap();

        engine_a.join(
            Member {
                node_id: 1,
                node_type: NodeType::Router,
                ip: addr_a.ip(),
                gossip_port: addr_a.port(),
                data_port: addr_a.port(),
                status: Status::Alive,
                incarnation: 0,
                last_seen_ms: 0,
            },
            None,
        );
        engine_b.join(
            Member {
                node_id: 2,
                node_type: NodeType::Worker,
                ip: addr_b.ip(),
                gossip_port: addr_b.port(),
                data_port: addr_b.port(),
                status: Status::Alive,
                incarnation: 0,
                last_seen_ms: 0,
            },
            Some((addr_a.ip(), addr_a.port())),
        );

        std::thread::sleep(StdDuration::from_millis(400));
        assert!(view_a.contains(2));

        engine_a.shutdown();
        engine_b.shutdown();
    }
}
