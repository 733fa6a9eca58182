//! The RPC client (§4.7): synchronous `call` and fire-and-forget `send`.
//! Responses are matched by `request_id`.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::rpc::frame::{Frame, FrameType};
use crate::rpc::status::Status;
use crate::transport::stream;

static NEXT_REQUEST_ID: AtomicU32 = AtomicU32::new(1);

fn next_request_id() -> u32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Client;

impl Client {
    /// Opens a connection, sends one request, and blocks for the matching
    /// response (or `timeout`). Each call pays a fresh connection; callers
    /// that need to hold a connection open should frame requests
    /// themselves over a connection they keep alive.
    pub fn call(
        addr: SocketAddr,
        local_id: u16,
        function_id: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> std::io::Result<(Status, Vec<u8>)> {
        let request_id = next_request_id();
        let mut stream = stream::connect(addr, timeout)?;

        let request = Frame {
            request_id,
            sender_id: local_id,
            frame_type: FrameType::Request,
            status: Status::Success,
            function_id,
            payload: payload.to_vec(),
        };
        stream.write_all(&request.encode())?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match Frame::decode(&buf) {
                Ok(Some((frame, _))) if frame.request_id == request_id => {
                    return Ok((frame.status, frame.payload));
                }
                Ok(Some((_, consumed))) => {
                    buf.drain(..consumed);
                    continue;
                }
                _ => {}
            }
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed before a response arrived"));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Fires a request without waiting for a response.
    pub fn send(addr: SocketAddr, local_id: u16, function_id: u8, payload: &[u8], timeout: Duration) -> std::io::Result<()> {
        let request = Frame {
            request_id: next_request_id(),
            sender_id: local_id,
            frame_type: FrameType::Request,
            status: Status::Success,
            function_id,
            payload: payload.to_vec(),
        };
        let mut stream = stream::connect(addr, timeout)?;
        stream.write_all(&request.encode())
    }
}
