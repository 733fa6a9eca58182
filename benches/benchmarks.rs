use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use swimraft::gossip::message::{GossipMessage, MemberUpdate, MsgType};
use swimraft::rpc::{function_id, Client, HandlerRegistry, RpcServer, Status};

fn sample_update(node_id: u16) -> MemberUpdate {
    MemberUpdate {
        node_id,
        node_type: swimraft::cluster::member::NodeType::Worker,
        status: swimraft::cluster::member::Status::Alive,
        ip: "127.0.0.1".parse().unwrap(),
        gossip_port: 10000 + node_id,
        data_port: 20000 + node_id,
        incarnation: 1,
        timestamp_ms: 1_000,
    }
}

fn criterion_benchmarks(c: &mut Criterion) {
    c.bench_function("gossip ping encode+decode, max piggyback", |b| {
        let msg = GossipMessage {
            msg_type: MsgType::Ping,
            sender_id: 1,
            sequence_num: 1,
            updates: (2..12).map(sample_update).collect(),
        };
        b.iter(|| {
            let encoded = msg.encode();
            GossipMessage::decode(&encoded).unwrap()
        });
    });

    let registry = Arc::new(HandlerRegistry::new());
    registry.register(
        function_id::EXAMPLE_ADD,
        Box::new(|req| {
            let mut out = req.to_vec();
            out.push(b'!');
            (Status::Success, out)
        }),
    );
    let mut server = RpcServer::start("127.0.0.1:0".parse().unwrap(), 1, registry).unwrap();
    let addr = server.local_addr();

    c.bench_function("rpc call round trip over a persistent connection", |b| {
        b.iter(|| {
            Client::call(addr, 2, function_id::EXAMPLE_ADD, b"ping", Duration::from_secs(1)).unwrap()
        });
    });

    server.stop();
}

criterion_group!(benches, criterion_benchmarks);
criterion_main!(benches);
