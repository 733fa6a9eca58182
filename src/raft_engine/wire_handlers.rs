//! Server-side Raft RPC handlers (§4.7, function ids `0x40-0x42`):
//! decode a wire request, drive [`raft::RaftCore`], encode the response.
//! Registered with a [`HandlerRegistry`] by [`super::RaftEngine::start`].

use std::sync::{Arc, Mutex};

use raft::wire::{AppendEntriesRequest, InstallSnapshotRequest, RequestVoteRequest};

use crate::raft_engine::NodeCore;
use crate::rpc::{HandlerRegistry, Status};

pub fn register(registry: &HandlerRegistry, core: Arc<Mutex<NodeCore>>) {
    let vote_core = core.clone();
    registry.register(
        crate::rpc::function_id::RAFT_REQUEST_VOTE,
        Box::new(move |payload| match RequestVoteRequest::decode(payload) {
            Ok(req) => {
                let resp = vote_core.lock().expect("raft core lock poisoned").handle_request_vote_request(&req);
                (Status::Success, resp.encode())
            }
            Err(e) => {
                log::warn!("malformed RequestVote payload: {}", e);
                (Status::BadArgument, Vec::new())
            }
        }),
    );

    let append_core = core.clone();
    registry.register(
        crate::rpc::function_id::RAFT_APPEND_ENTRIES,
        Box::new(move |payload| match AppendEntriesRequest::decode(payload) {
            Ok(req) => {
                let resp = append_core.lock().expect("raft core lock poisoned").handle_append_entries_request(&req);
                (Status::Success, resp.encode())
            }
            Err(e) => {
                log::warn!("malformed AppendEntries payload: {}", e);
                (Status::BadArgument, Vec::new())
            }
        }),
    );

    let snapshot_core = core;
    registry.register(
        crate::rpc::function_id::RAFT_INSTALL_SNAPSHOT,
        Box::new(move |payload| match InstallSnapshotRequest::decode(payload) {
            Ok(req) => {
                let resp = snapshot_core.lock().expect("raft core lock poisoned").handle_install_snapshot_request(&req);
                (Status::Success, resp.encode())
            }
            Err(e) => {
                log::warn!("malformed InstallSnapshot payload: {}", e);
                (Status::BadArgument, Vec::new())
            }
        }),
    );
}
