//! `mio`-backed stream transport for the RPC substrate (§4.7): a
//! readiness-based event loop over one listener plus one socket per
//! accepted connection, edge-triggered on both.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

pub const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Owns the listener, the poller, and per-connection sockets keyed by
/// `mio::Token`. Connections persist; `SO_REUSEADDR`/`TCP_NODELAY` are set
/// per §4.7.
pub struct StreamListener {
    pub poll: Poll,
    pub listener: TcpListener,
    pub connections: HashMap<Token, TcpStream>,
    next_token: usize,
}

impl StreamListener {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(StreamListener {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Accepts every pending connection, registering each for
    /// readability. Returns the newly accepted tokens.
    pub fn accept_all(&mut self) -> io::Result<Vec<Token>> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let token = self.alloc_token();
                    self.poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    self.connections.insert(token, stream);
                    accepted.push(token);
                    log::debug!("rpc: accepted connection from {}", peer);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(accepted)
    }

    pub fn poll(&mut self, events: &mut Events) -> io::Result<()> {
        self.poll.poll(events, Some(POLL_TIMEOUT))
    }

    pub fn read_from(&mut self, token: Token, buf: &mut Vec<u8>) -> io::Result<usize> {
        let stream = self.connections.get_mut(&token).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown connection token"))?;
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    total += n;
                    if n < chunk.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    pub fn write_to(&mut self, token: Token, buf: &[u8]) -> io::Result<()> {
        let stream = self.connections.get_mut(&token).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown connection token"))?;
        stream.write_all(buf)
    }

    pub fn close(&mut self, token: Token) {
        if let Some(mut stream) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }
}

pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<std::net::TcpStream> {
    let stream = std::net::TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}
