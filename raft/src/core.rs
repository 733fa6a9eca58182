//! The pure Raft consensus state machine.
//!
//! `RaftCore` never touches a socket and never spawns a thread — ticking it
//! forward and feeding it RPCs is the owning engine's job (in this repo,
//! `raft_engine` in the root crate, which plays the same role for Raft that
//! `gossip::engine` plays for SWIM: it binds a pure protocol state machine
//! to real transport). This mirrors the "raw callbacks" REDESIGN FLAGS
//! entry: instead of `(fn_pointer, void_ptr)` pairs, `RaftCore` is generic
//! over a [`RaftCallbacks`] implementation it owns directly.

use std::collections::HashMap;

use rand::Rng;

use crate::callbacks::RaftCallbacks;
use crate::consensus::{is_majority, majority_match_index};
use crate::log::Log;
use crate::message::{EntryType, LogEntry, LogIndex, NodeId, PeerProgress, Role, Term};
use crate::wire::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    RequestVoteRequest, RequestVoteResponse,
};

/// Tunable timing, all expressed in milliseconds measured by whatever clock
/// the engine feeds into `tick_*`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_entries_per_append: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            max_entries_per_append: 64,
        }
    }
}

/// A message `RaftCore` wants sent to a specific peer. The engine is
/// responsible for framing and delivering it over the RPC substrate.
#[derive(Debug, Clone)]
pub enum Outbound {
    RequestVote(RequestVoteRequest),
    AppendEntries(AppendEntriesRequest),
    InstallSnapshot(InstallSnapshotRequest),
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub current_term: Term,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub is_leader: bool,
}

pub struct RaftCore<L: Log, C: RaftCallbacks> {
    id: NodeId,
    peers: Vec<NodeId>,
    log: L,
    callbacks: C,
    config: Config,

    role: Role,
    current_term: Term,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,

    commit_index: LogIndex,
    last_applied: LogIndex,

    election_timeout_ms: u64,
    ms_since_last_heartbeat: u64,
    votes_received: std::collections::HashSet<NodeId>,

    leader_state: HashMap<NodeId, PeerProgress>,
    ms_since_last_append: u64,
}

impl<L: Log, C: RaftCallbacks> RaftCore<L, C> {
    pub fn new(id: NodeId, peers: Vec<NodeId>, log: L, callbacks: C, config: Config) -> Self {
        let (current_term, voted_for) = log.load_term_and_vote();
        let last_applied = log.snapshot_meta().last_included_index;
        let election_timeout_ms = random_election_timeout(&config);
        RaftCore {
            id,
            peers,
            log,
            callbacks,
            config,
            role: Role::Follower,
            current_term,
            voted_for,
            leader_id: None,
            commit_index: last_applied,
            last_applied,
            election_timeout_ms,
            ms_since_last_heartbeat: 0,
            votes_received: std::collections::HashSet::new(),
            leader_state: HashMap::new(),
            ms_since_last_append: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn stats(&self) -> Stats {
        Stats {
            current_term: self.current_term,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            is_leader: self.is_leader(),
        }
    }

    pub fn peer_progress(&self, peer: NodeId) -> Option<PeerProgress> {
        self.leader_state.get(&peer).copied()
    }

    pub fn add_peer(&mut self, peer: NodeId) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
            if self.is_leader() {
                self.leader_state
                    .insert(peer, PeerProgress::new(self.log.last_index()));
            }
        }
    }

    pub fn remove_peer(&mut self, peer: NodeId) {
        self.peers.retain(|p| *p != peer);
        self.leader_state.remove(&peer);
    }

    fn total_peers(&self) -> usize {
        self.peers.len() + 1
    }

    fn step_down(&mut self, new_term: Term) {
        self.current_term = new_term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.leader_state.clear();
        self.votes_received.clear();
        let _ = self.log.save_term_and_vote(self.current_term, self.voted_for);
    }

    fn reset_election_timer(&mut self) {
        self.ms_since_last_heartbeat = 0;
        self.election_timeout_ms = random_election_timeout(&self.config);
    }

    /// Submits a client command. Only valid on the leader; returns
    /// `(index, term)` of the appended entry.
    pub fn submit_command(&mut self, data: Vec<u8>, client_id: u16, now_ms: u64) -> Result<(LogIndex, Term), NotLeaderError> {
        if !self.is_leader() {
            return Err(NotLeaderError { leader_id: self.leader_id });
        }
        let entry = self.append_local(EntryType::Command, data, client_id, now_ms);
        self.advance_commit_index();
        Ok((entry.index, entry.term))
    }

    fn append_local(&mut self, entry_type: EntryType, data: Vec<u8>, client_id: u16, now_ms: u64) -> LogEntry {
        let entry = LogEntry {
            term: self.current_term,
            index: self.log.last_index() + 1,
            entry_type,
            data,
            timestamp_ms: now_ms,
            client_id,
        };
        let _ = self.log.append(entry.clone());
        if self.is_leader() {
            self.leader_state.insert(
                self.id,
                PeerProgress {
                    next_index: entry.index + 1,
                    match_index: entry.index,
                },
            );
        }
        entry
    }

    /// Drives the election timer. Call roughly every 10ms per §4.5.
    /// Returns `RequestVote` messages to send to every peer if this tick
    /// triggered a new election.
    pub fn tick_election(&mut self, elapsed_ms: u64, now_ms: u64) -> Vec<(NodeId, Outbound)> {
        if self.role == Role::Leader || self.role == Role::ShuttingDown {
            return Vec::new();
        }
        self.ms_since_last_heartbeat += elapsed_ms;
        if self.ms_since_last_heartbeat < self.election_timeout_ms {
            return Vec::new();
        }

        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.votes_received.clear();
        self.votes_received.insert(self.id);
        self.leader_id = None;
        let _ = self.log.save_term_and_vote(self.current_term, self.voted_for);
        self.reset_election_timer();

        if is_majority(self.votes_received.len(), self.total_peers()) {
            self.become_leader(now_ms);
            return Vec::new();
        }

        let req = RequestVoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        self.peers
            .iter()
            .map(|&peer| (peer, Outbound::RequestVote(req.clone())))
            .collect()
    }

    fn become_leader(&mut self, now_ms: u64) {
        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        self.leader_state.clear();
        let last_index = self.log.last_index();
        for &peer in &self.peers {
            self.leader_state.insert(peer, PeerProgress::new(last_index));
        }
        self.leader_state.insert(
            self.id,
            PeerProgress {
                next_index: last_index + 1,
                match_index: last_index,
            },
        );
        self.ms_since_last_append = self.config.heartbeat_interval_ms;
        // No-op "read-your-writes" commit barrier.
        self.append_local(EntryType::Noop, Vec::new(), 0, now_ms);
        self.advance_commit_index();
    }

    pub fn handle_request_vote_request(&mut self, req: &RequestVoteRequest) -> RequestVoteResponse {
        if req.term > self.current_term {
            self.step_down(req.term);
        }
        if req.term < self.current_term {
            return RequestVoteResponse { term: self.current_term, vote_granted: false };
        }

        let can_vote = self.voted_for.is_none() || self.voted_for == Some(req.candidate_id);
        let candidate_up_to_date = (req.last_log_term, req.last_log_index)
            >= (self.log.last_term(), self.log.last_index());

        let grant = can_vote && candidate_up_to_date;
        if grant {
            self.voted_for = Some(req.candidate_id);
            let _ = self.log.save_term_and_vote(self.current_term, self.voted_for);
            self.reset_election_timer();
        }

        RequestVoteResponse { term: self.current_term, vote_granted: grant }
    }

    /// Returns `true` if this response won the election (the caller should
    /// stop sending more RequestVote RPCs for this term).
    pub fn handle_request_vote_response(&mut self, from: NodeId, resp: &RequestVoteResponse, now_ms: u64) -> bool {
        if resp.term > self.current_term {
            self.step_down(resp.term);
            return false;
        }
        if self.role != Role::Candidate || resp.term != self.current_term || !resp.vote_granted {
            return false;
        }
        self.votes_received.insert(from);
        if is_majority(self.votes_received.len(), self.total_peers()) {
            self.become_leader(now_ms);
            return true;
        }
        false
    }

    pub fn handle_append_entries_request(&mut self, req: &AppendEntriesRequest) -> AppendEntriesResponse {
        if req.term > self.current_term {
            self.step_down(req.term);
        }
        if req.term < self.current_term {
            return AppendEntriesResponse { term: self.current_term, success: false, match_index: 0 };
        }

        self.role = Role::Follower;
        self.leader_id = Some(req.leader_id);
        self.reset_election_timer();

        let has_prev = req.prev_log_index == 0
            || self.log.term_at(req.prev_log_index) == Some(req.prev_log_term);
        if !has_prev {
            return AppendEntriesResponse { term: self.current_term, success: false, match_index: 0 };
        }

        let mut next_index = req.prev_log_index;
        for entry in &req.entries {
            if let Some(existing_term) = self.log.term_at(entry.index) {
                if existing_term != entry.term {
                    let _ = self.log.truncate_suffix(entry.index);
                    let _ = self.log.append(entry.clone());
                }
            } else {
                let _ = self.log.append(entry.clone());
            }
            next_index = entry.index;
        }
        if next_index == req.prev_log_index && req.entries.is_empty() {
            next_index = self.log.last_index();
        }

        if req.leader_commit > self.commit_index {
            self.commit_index = req.leader_commit.min(next_index);
        }

        AppendEntriesResponse { term: self.current_term, success: true, match_index: next_index }
    }

    pub fn handle_append_entries_response(&mut self, from: NodeId, resp: &AppendEntriesResponse) {
        if resp.term > self.current_term {
            self.step_down(resp.term);
            return;
        }
        if !self.is_leader() || resp.term != self.current_term {
            return;
        }

        let progress = self.leader_state.entry(from).or_insert_with(|| PeerProgress::new(0));
        if resp.success {
            progress.match_index = resp.match_index;
            progress.next_index = resp.match_index + 1;
        } else {
            progress.next_index = progress.next_index.saturating_sub(1).max(1);
        }

        self.advance_commit_index();
    }

    fn advance_commit_index(&mut self) {
        let self_index = self
            .leader_state
            .get(&self.id)
            .map(|p| p.match_index)
            .unwrap_or_else(|| self.log.last_index());
        let match_indices: Vec<LogIndex> = self
            .peers
            .iter()
            .filter_map(|p| self.leader_state.get(p).map(|pr| pr.match_index))
            .collect();
        let candidate = majority_match_index(match_indices, self_index, self.total_peers());
        if candidate > self.commit_index {
            if let Some(term) = self.log.term_at(candidate) {
                if term == self.current_term {
                    verbose!("advancing commit_index {} -> {}", self.commit_index, candidate);
                    self.commit_index = candidate;
                }
            }
        }
    }

    pub fn handle_install_snapshot_request(&mut self, req: &InstallSnapshotRequest) -> InstallSnapshotResponse {
        if req.term > self.current_term {
            self.step_down(req.term);
        }
        if req.term < self.current_term {
            return InstallSnapshotResponse { term: self.current_term };
        }
        self.role = Role::Follower;
        self.leader_id = Some(req.leader_id);
        self.reset_election_timer();

        if req.offset != 0 || !req.done {
            // Multi-chunk accumulation is a reserved extension (§9 open
            // question); a non-zero offset or not-done chunk is dropped.
            log::warn!(
                "dropping non-single-chunk InstallSnapshot from {} (offset={}, done={})",
                req.leader_id, req.offset, req.done
            );
            return InstallSnapshotResponse { term: self.current_term };
        }

        let meta = crate::message::SnapshotMeta {
            last_included_index: req.last_included_index,
            last_included_term: req.last_included_term,
        };
        self.callbacks.on_snapshot_restore(&req.data, meta);
        let _ = self.log.truncate_prefix(req.last_included_index);
        let _ = self.log.save_snapshot_meta(meta);

        if req.last_included_index > self.commit_index {
            self.commit_index = req.last_included_index;
        }
        if req.last_included_index > self.last_applied {
            self.last_applied = req.last_included_index;
        }

        InstallSnapshotResponse { term: self.current_term }
    }

    pub fn handle_install_snapshot_response(&mut self, resp: &InstallSnapshotResponse) {
        if resp.term > self.current_term {
            self.step_down(resp.term);
        }
    }

    /// Drives heartbeat/replication. Call roughly every `heartbeat_interval_ms`.
    /// Returns the AppendEntries (or InstallSnapshot, if the peer has
    /// fallen behind the retained log) to send to each peer.
    pub fn tick_heartbeat(&mut self, elapsed_ms: u64) -> Vec<(NodeId, Outbound)> {
        if !self.is_leader() {
            return Vec::new();
        }
        self.ms_since_last_append += elapsed_ms;
        if self.ms_since_last_append < self.config.heartbeat_interval_ms {
            return Vec::new();
        }
        self.ms_since_last_append = 0;

        let mut out = Vec::with_capacity(self.peers.len());
        let snapshot_meta = self.log.snapshot_meta();
        for &peer in self.peers.clone().iter() {
            let next_index = self
                .leader_state
                .get(&peer)
                .map(|p| p.next_index)
                .unwrap_or(1);

            if next_index <= snapshot_meta.last_included_index {
                let (data, meta) = self.callbacks.on_snapshot_create();
                out.push((
                    peer,
                    Outbound::InstallSnapshot(InstallSnapshotRequest {
                        term: self.current_term,
                        leader_id: self.id,
                        last_included_index: meta.last_included_index,
                        last_included_term: meta.last_included_term,
                        offset: 0,
                        data,
                        done: true,
                    }),
                ));
                continue;
            }

            let prev_log_index = next_index.saturating_sub(1);
            let prev_log_term = self.log.term_at(prev_log_index).unwrap_or(0);
            let mut entries = Vec::new();
            let mut idx = next_index;
            let last_index = self.log.last_index();
            while idx <= last_index && entries.len() < self.config.max_entries_per_append {
                if let Some(entry) = self.log.get(idx) {
                    entries.push(entry);
                }
                idx += 1;
            }

            out.push((
                peer,
                Outbound::AppendEntries(AppendEntriesRequest {
                    term: self.current_term,
                    leader_id: self.id,
                    prev_log_index,
                    prev_log_term,
                    leader_commit: self.commit_index,
                    entries,
                }),
            ));
        }
        out
    }

    /// Applies every newly-committed entry, in order, via `on_apply`. Call
    /// roughly every 10ms; returns the number of entries applied.
    pub fn tick_apply(&mut self) -> usize {
        let mut applied = 0;
        while self.last_applied < self.commit_index {
            let next = self.last_applied + 1;
            if let Some(entry) = self.log.get(next) {
                self.callbacks.on_apply(&entry);
                self.last_applied = next;
                applied += 1;
            } else {
                break;
            }
        }
        applied
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotLeaderError {
    pub leader_id: Option<NodeId>,
}

impl std::fmt::Display for NotLeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not leader (current leader: {:?})", self.leader_id)
    }
}

impl std::error::Error for NotLeaderError {}

fn random_election_timeout(config: &Config) -> u64 {
    rand::thread_rng().gen_range(config.election_timeout_min_ms..=config.election_timeout_max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::memory::InMemoryLog;

    #[derive(Default)]
    struct NoopCallbacks {
        applied: Vec<LogEntry>,
    }
    impl RaftCallbacks for NoopCallbacks {
        fn on_apply(&mut self, entry: &LogEntry) {
            self.applied.push(entry.clone());
        }
        fn on_snapshot_create(&mut self) -> (Vec<u8>, crate::message::SnapshotMeta) {
            (Vec::new(), crate::message::SnapshotMeta::default())
        }
        fn on_snapshot_restore(&mut self, _data: &[u8], _meta: crate::message::SnapshotMeta) {}
    }

    fn core(id: NodeId, peers: Vec<NodeId>) -> RaftCore<InMemoryLog, NoopCallbacks> {
        RaftCore::new(id, peers, InMemoryLog::new(), NoopCallbacks::default(), Config {
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 150,
            heartbeat_interval_ms: 50,
            max_entries_per_append: 64,
        })
    }

    #[test]
    fn election_timeout_triggers_candidacy_and_vote_requests() {
        let mut node = core(1, vec![2, 3]);
        let out = node.tick_election(200, 1000);
        assert_eq!(out.len(), 2);
        assert_eq!(node.current_term(), 1);
        assert!(!node.is_leader());
    }

    #[test]
    fn majority_votes_become_leader_and_append_noop() {
        let mut node = core(1, vec![2, 3]);
        node.tick_election(200, 1000);
        let won = node.handle_request_vote_response(2, &RequestVoteResponse { term: 1, vote_granted: true }, 1000);
        assert!(won);
        assert!(node.is_leader());
        assert_eq!(node.log().last_index(), 1);
        assert_eq!(node.log().get(1).unwrap().entry_type, EntryType::Noop);
    }

    #[test]
    fn higher_term_response_steps_down_candidate() {
        let mut node = core(1, vec![2, 3]);
        node.tick_election(200, 1000);
        node.handle_request_vote_response(2, &RequestVoteResponse { term: 5, vote_granted: false }, 1000);
        assert!(!node.is_leader());
        assert_eq!(node.current_term(), 5);
    }

    #[test]
    fn append_entries_rejects_stale_term() {
        let mut node = core(1, vec![2]);
        node.tick_election(200, 1000); // term 1
        let resp = node.handle_append_entries_request(&AppendEntriesRequest {
            term: 0,
            leader_id: 2,
            prev_log_index: 0,
            prev_log_term: 0,
            leader_commit: 0,
            entries: vec![],
        });
        assert!(!resp.success);
    }

    #[test]
    fn commit_index_advances_on_majority_match() {
        let mut leader = core(1, vec![2, 3]);
        leader.tick_election(200, 1000);
        leader.handle_request_vote_response(2, &RequestVoteResponse { term: 1, vote_granted: true }, 1000);
        leader.submit_command(b"x".to_vec(), 0, 1000).unwrap(); // index 2
        leader.handle_append_entries_response(2, &AppendEntriesResponse { term: 1, success: true, match_index: 2 });
        assert_eq!(leader.commit_index(), 2);
    }

    #[test]
    fn follower_grants_vote_for_up_to_date_candidate() {
        let mut follower = core(2, vec![1, 3]);
        let resp = follower.handle_request_vote_request(&RequestVoteRequest {
            term: 1,
            candidate_id: 1,
            last_log_index: 0,
            last_log_term: 0,
        });
        assert!(resp.vote_granted);
    }

    #[test]
    fn apply_runs_in_order_and_stops_at_commit_index() {
        let mut leader = core(1, vec![2]);
        leader.tick_election(200, 1000);
        leader.handle_request_vote_response(2, &RequestVoteResponse { term: 1, vote_granted: true }, 1000);
        leader.submit_command(b"a".to_vec(), 0, 1000).unwrap();
        leader.submit_command(b"b".to_vec(), 0, 1000).unwrap();
        // commit_index still 0 until a majority replicates
        assert_eq!(leader.tick_apply(), 0);
        leader.handle_append_entries_response(2, &AppendEntriesResponse { term: 1, success: true, match_index: 3 });
        assert_eq!(leader.commit_index(), 3);
        assert_eq!(leader.tick_apply(), 3);
        assert_eq!(leader.last_applied(), 3);
    }

    /// `random_election_timeout` draws from `rand::thread_rng()`, so this
    /// exercises the same `gen_range` call against a seeded, reproducible
    /// generator to pin the bound-respecting property across many draws
    /// without relying on the system RNG.
    #[test]
    fn election_timeout_draw_stays_within_configured_bounds() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let config = Config {
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            max_entries_per_append: 64,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..1000 {
            let draw = rng.gen_range(config.election_timeout_min_ms..=config.election_timeout_max_ms);
            assert!(draw >= config.election_timeout_min_ms && draw <= config.election_timeout_max_ms);
        }
    }
}
