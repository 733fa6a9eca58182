//! Non-blocking UDP transport (§4.2). Binds once; `send` is thread-safe
//! (the underlying socket supports concurrent `send_to` from multiple
//! threads); a background receiver invokes a callback for every datagram
//! and tolerates `EAGAIN` with a short sleep.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long the receive loop sleeps after an `EAGAIN` before polling again.
const POLL_SLEEP: Duration = Duration::from_millis(5);
const MAX_DATAGRAM: usize = 2048;

pub struct DatagramTransport {
    socket: Arc<UdpSocket>,
    shutdown: Arc<AtomicBool>,
    receive_handle: Option<thread::JoinHandle<()>>,
}

impl DatagramTransport {
    pub fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(DatagramTransport {
            socket: Arc::new(socket),
            shutdown: Arc::new(AtomicBool::new(false)),
            receive_handle: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn send(&self, buf: &[u8], dest: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(buf, dest)
    }

    /// Spawns the background receiver. `on_datagram(buf, src)` runs on the
    /// receiver thread; keep it cheap (it should hand off work, not block).
    pub fn start_receiving<F>(&mut self, mut on_datagram: F)
    where
        F: FnMut(&[u8], SocketAddr) + Send + 'static,
    {
        let socket = self.socket.clone();
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name("gossip-recv".to_string())
            .spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                while !shutdown.load(Ordering::Relaxed) {
                    match socket.recv_from(&mut buf) {
                        Ok((len, src)) => on_datagram(&buf[..len], src),
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            thread::sleep(POLL_SLEEP);
                        }
                        Err(e) => {
                            log::warn!("gossip datagram receive error: {}", e);
                            thread::sleep(POLL_SLEEP);
                        }
                    }
                }
            })
            .expect("spawning the gossip receive thread");
        self.receive_handle = Some(handle);
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.receive_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn send_and_receive_round_trip() {
        let mut a = DatagramTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b = DatagramTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let (tx, rx) = mpsc::channel();
        a.start_receiving(move |buf, src| {
            let _ = tx.send((buf.to_vec(), src));
        });

        b.send(b"hello", a.local_addr().unwrap()).unwrap();
        let (received, _src) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, b"hello");
    }
}
