use std::net::{IpAddr, Ipv4Addr};

use rstest::rstest;

use super::member::{NodeType, Status};
use super::{ClusterView, Member};

fn member(id: u16, status: Status, incarnation: u64) -> Member {
    Member {
        node_id: id,
        node_type: NodeType::Worker,
        ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        gossip_port: 10000 + id,
        data_port: 20000 + id,
        status,
        incarnation,
        last_seen_ms: 0,
    }
}

/// The Merge Rule's escalation order (`alive -> suspect -> dead`) applied
/// across the full incarnation/status product space: higher incarnation
/// always wins, equal incarnation only moves forward in rank, and stale
/// incarnation is always rejected.
#[rstest]
#[case(Status::Alive, 0, Status::Suspect, 0, true)]
#[case(Status::Suspect, 3, Status::Alive, 3, false)]
#[case(Status::Alive, 5, Status::Dead, 4, false)]
#[case(Status::Suspect, 2, Status::Dead, 2, true)]
#[case(Status::Dead, 1, Status::Alive, 1, false)]
#[case(Status::Dead, 1, Status::Alive, 2, true)]
#[case(Status::Alive, 0, Status::Alive, 0, false)]
fn update_status_follows_the_merge_rule(
    #[case] current: Status,
    #[case] current_incarnation: u64,
    #[case] incoming: Status,
    #[case] incoming_incarnation: u64,
    #[case] applies: bool,
) {
    let view = ClusterView::new(1);
    view.add(member(2, current, current_incarnation));
    assert_eq!(view.update_status(2, incoming, incoming_incarnation), applies);
    let expected = if applies { incoming } else { current };
    assert_eq!(view.get(2).unwrap().status, expected);
}

#[test]
fn list_peers_excludes_self_and_dead() {
    let view = ClusterView::new(1);
    view.add(member(1, Status::Alive, 0));
    view.add(member(2, Status::Alive, 0));
    view.add(member(3, Status::Dead, 0));
    let peers = view.list_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].node_id, 2);
}

#[test]
fn remove_drops_the_member() {
    let view = ClusterView::new(1);
    view.add(member(2, Status::Alive, 0));
    assert!(view.remove(2).is_some());
    assert!(view.get(2).is_none());
}
