//! The Raft log entry payload format for KV writes (§4.6):
//!
//! ```text
//! SET:   [type=1][key_len:2][key][value_len:4][value]
//! UNSET: [type=2][key_len:2][key]
//! ```
//!
//! All integers big-endian. This is the `data` field of a Raft
//! [`LogEntry`](raft::message::LogEntry) of type `Command`.

use std::convert::TryInto;

use crate::error::{KvError, Result};

pub const MAX_KEY_LEN: usize = 256;
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: Vec<u8>, value: Vec<u8> },
    Unset { key: Vec<u8> },
}

fn key_is_valid(key: &[u8]) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.iter().all(|&b| {
            b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':' | b'/')
        })
}

impl Command {
    pub fn set(key: Vec<u8>, value: Vec<u8>) -> Result<Self> {
        if !key_is_valid(&key) {
            return Err(KvError::InvalidKey);
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(KvError::ValueTooLarge);
        }
        Ok(Command::Set { key, value })
    }

    pub fn unset(key: Vec<u8>) -> Result<Self> {
        if !key_is_valid(&key) {
            return Err(KvError::InvalidKey);
        }
        Ok(Command::Unset { key })
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Set { key, value } => {
                let mut out = Vec::with_capacity(1 + 2 + key.len() + 4 + value.len());
                out.push(1);
                out.extend_from_slice(&(key.len() as u16).to_be_bytes());
                out.extend_from_slice(key);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value);
                out
            }
            Command::Unset { key } => {
                let mut out = Vec::with_capacity(1 + 2 + key.len());
                out.push(2);
                out.extend_from_slice(&(key.len() as u16).to_be_bytes());
                out.extend_from_slice(key);
                out
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(KvError::MalformedCommand("empty command"));
        }
        let key_len_at = |pos: usize| -> Result<usize> {
            if buf.len() < pos + 2 {
                return Err(KvError::MalformedCommand("truncated key length"));
            }
            Ok(u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize)
        };

        match buf[0] {
            1 => {
                let key_len = key_len_at(1)?;
                let key_start = 3;
                if buf.len() < key_start + key_len + 4 {
                    return Err(KvError::MalformedCommand("truncated SET"));
                }
                let key = buf[key_start..key_start + key_len].to_vec();
                let value_len_start = key_start + key_len;
                let value_len = u32::from_be_bytes(
                    buf[value_len_start..value_len_start + 4].try_into().unwrap(),
                ) as usize;
                let value_start = value_len_start + 4;
                if buf.len() < value_start + value_len {
                    return Err(KvError::MalformedCommand("truncated SET value"));
                }
                let value = buf[value_start..value_start + value_len].to_vec();
                Ok(Command::Set { key, value })
            }
            2 => {
                let key_len = key_len_at(1)?;
                let key_start = 3;
                if buf.len() < key_start + key_len {
                    return Err(KvError::MalformedCommand("truncated UNSET"));
                }
                Ok(Command::Unset { key: buf[key_start..key_start + key_len].to_vec() })
            }
            _ => Err(KvError::MalformedCommand("unknown command type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_round_trips() {
        let cmd = Command::set(b"k".to_vec(), b"v".to_vec()).unwrap();
        let encoded = cmd.encode();
        assert_eq!(Command::decode(&encoded).unwrap(), cmd);
    }

    #[test]
    fn unset_round_trips() {
        let cmd = Command::unset(b"some/key-1.0_a".to_vec()).unwrap();
        assert_eq!(Command::decode(&cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn rejects_invalid_key_charset() {
        assert!(Command::set(b"bad key!".to_vec(), vec![]).is_err());
    }

    #[test]
    fn rejects_oversized_value() {
        let huge = vec![0u8; MAX_VALUE_LEN + 1];
        assert!(Command::set(b"k".to_vec(), huge).is_err());
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        assert!(Command::decode(&[1, 0, 5, b'a']).is_err());
    }
}
