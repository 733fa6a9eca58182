//! The RPC server event loop (§4.7): a readiness-based loop over the
//! listen socket and one accepted socket per connection. Decoded frames
//! dispatch synchronously to the handler registry; responses are framed
//! and written back on the same socket. Connections persist.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mio::{Events, Token};

use crate::rpc::frame::{Frame, FrameType};
use crate::rpc::registry::HandlerRegistry;
use crate::rpc::status::Status;
use crate::transport::stream::{StreamListener, LISTENER_TOKEN};

pub struct RpcServer {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl RpcServer {
    /// Binds `addr` and spawns the event-loop thread, dispatching requests
    /// to `registry`. The local node's id is stamped on every response
    /// frame's `sender_id`.
    pub fn start(addr: SocketAddr, local_id: u16, registry: Arc<HandlerRegistry>) -> std::io::Result<Self> {
        let mut listener = StreamListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("rpc-server".to_string())
            .spawn(move || {
                let mut events = Events::with_capacity(256);
                let mut buffers: HashMap<Token, Vec<u8>> = HashMap::new();

                while !thread_shutdown.load(Ordering::Relaxed) {
                    if let Err(e) = listener.poll(&mut events) {
                        log::warn!("rpc server poll error: {}", e);
                        continue;
                    }

                    for event in events.iter() {
                        if event.token() == LISTENER_TOKEN {
                            match listener.accept_all() {
                                Ok(tokens) => {
                                    for token in tokens {
                                        buffers.insert(token, Vec::new());
                                    }
                                }
                                Err(e) => log::warn!("rpc server accept error: {}", e),
                            }
                            continue;
                        }

                        let token = event.token();
                        let buf = buffers.entry(token).or_insert_with(Vec::new);
                        match listener.read_from(token, buf) {
                            Ok(0) if buf.is_empty() => {
                                listener.close(token);
                                buffers.remove(&token);
                                continue;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                log::warn!("rpc connection read error: {}", e);
                                listener.close(token);
                                buffers.remove(&token);
                                continue;
                            }
                        }

                        loop {
                            match Frame::decode(buf) {
                                Ok(Some((frame, consumed))) => {
                                    buf.drain(..consumed);
                                    if frame.frame_type != FrameType::Request {
                                        continue;
                                    }
                                    let (status, response) = registry.dispatch(frame.function_id, &frame.payload);
                                    let reply = Frame {
                                        request_id: frame.request_id,
                                        sender_id: local_id,
                                        frame_type: FrameType::Response,
                                        status,
                                        function_id: frame.function_id,
                                        payload: response,
                                    };
                                    if let Err(e) = listener.write_to(token, &reply.encode()) {
                                        log::warn!("rpc response write error: {}", e);
                                        listener.close(token);
                                        buffers.remove(&token);
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    log::warn!("rpc frame decode error, closing connection: {}", e);
                                    listener.close(token);
                                    buffers.remove(&token);
                                    break;
                                }
                            }
                        }
                    }
                }
            })
            .expect("spawning the rpc server thread");

        Ok(RpcServer { shutdown, handle: Some(handle), local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::Client;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    #[serial]
    fn server_dispatches_a_registered_handler() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(0x01, Box::new(|req| {
            let mut out = req.to_vec();
            out.push(b'!');
            (Status::Success, out)
        }));

        let mut server = RpcServer::start("127.0.0.1:0".parse().unwrap(), 1, registry).unwrap();
        let addr = server.local_addr();

        let (status, resp) = Client::call(addr, 2, 0x01, b"hi", Duration::from_secs(1)).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(resp, b"hi!");

        server.stop();
    }

    #[test]
    #[serial]
    fn unregistered_function_id_returns_func_not_found() {
        let registry = Arc::new(HandlerRegistry::new());
        let mut server = RpcServer::start("127.0.0.1:0".parse().unwrap(), 1, registry).unwrap();
        let addr = server.local_addr();

        let (status, _resp) = Client::call(addr, 2, 0x02, b"x", Duration::from_secs(1)).unwrap();
        assert_eq!(status, Status::FuncNotFound);

        server.stop();
    }
}
