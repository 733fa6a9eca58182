//! Crate-wide error taxonomy (§7), one variant per taxonomy entry.
//!
//! Background threads never return this type — per §7 they log and
//! continue. `Error` is for the synchronous public APIs: `submit_command`,
//! `set`/`get`/`unset`, RPC `call`.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("timeout")]
    Timeout,

    #[error("not leader (current leader: {leader_id:?})")]
    NotLeader { leader_id: Option<u16> },

    #[error("network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, Error>;
