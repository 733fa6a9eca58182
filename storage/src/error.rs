#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("key must be 1..=256 bytes of [A-Za-z0-9_.:/-]")]
    InvalidKey,
    #[error("value exceeds the 1 MiB limit")]
    ValueTooLarge,
    #[error("key not found")]
    NotFound,
    #[error("malformed command: {0}")]
    MalformedCommand(&'static str),
}

pub type Result<T> = std::result::Result<T, KvError>;
