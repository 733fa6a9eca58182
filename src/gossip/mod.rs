//! SWIM membership and failure detection (§4.3/§4.4): wire codec, pure
//! protocol state machine, and the engine that drives it over UDP.

pub mod engine;
pub mod message;
pub mod protocol;

pub use engine::{ClusterEvent, GossipEngine};
pub use protocol::{GossipCallbacks, GossipConfig, GossipStats};
