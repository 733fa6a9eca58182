//! L1 transports: a non-blocking datagram endpoint for gossip (§4.2) and
//! an `mio`-backed stream listener for the RPC substrate (§4.7).

pub mod datagram;
pub mod stream;
