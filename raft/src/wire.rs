//! Byte-exact encode/decode of the Raft RPC payloads from §6 of the spec
//! this crate implements. Every layout here is big-endian and load-bearing:
//! the testable properties pin exact byte counts (a `RequestVote` request is
//! always 26 bytes, etc.).

use std::convert::TryInto;

use crate::message::{EntryType, LogEntry, LogIndex, NodeId, Term};

/// AppendEntries rejects any request claiming more than this many entries,
/// per the boundary behavior in §8.
pub const MAX_ENTRIES_PER_APPEND: u32 = 1000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("payload truncated: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown entry type byte {0}")]
    UnknownEntryType(u8),
    #[error("entry_count {0} exceeds the maximum of {max}", max = MAX_ENTRIES_PER_APPEND)]
    TooManyEntries(u32),
}

fn need(buf: &[u8], n: usize) -> Result<(), WireError> {
    if buf.len() < n {
        Err(WireError::Truncated { need: n, have: buf.len() })
    } else {
        Ok(())
    }
}

pub fn encode_entry(out: &mut Vec<u8>, entry: &LogEntry) {
    out.extend_from_slice(&entry.term.to_be_bytes());
    out.extend_from_slice(&entry.index.to_be_bytes());
    out.push(entry.entry_type as u8);
    out.extend_from_slice(&(entry.data.len() as u32).to_be_bytes());
    out.extend_from_slice(&entry.data);
    out.extend_from_slice(&entry.timestamp_ms.to_be_bytes());
    out.extend_from_slice(&entry.client_id.to_be_bytes());
}

/// Returns the decoded entry and the number of bytes consumed.
pub fn decode_entry(buf: &[u8]) -> Result<(LogEntry, usize), WireError> {
    need(buf, 8 + 8 + 1 + 4)?;
    let term = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let index = u64::from_be_bytes(buf[8..16].try_into().unwrap());
    let entry_type = EntryType::from_u8(buf[16]).ok_or(WireError::UnknownEntryType(buf[16]))?;
    let data_len = u32::from_be_bytes(buf[17..21].try_into().unwrap()) as usize;
    let mut pos = 21;
    need(buf, pos + data_len + 8 + 2)?;
    let data = buf[pos..pos + data_len].to_vec();
    pos += data_len;
    let timestamp_ms = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let client_id = u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap());
    pos += 2;
    Ok((
        LogEntry {
            term,
            index,
            entry_type,
            data,
            timestamp_ms,
            client_id,
        },
        pos,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

impl RequestVoteRequest {
    pub const ENCODED_LEN: usize = 26;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.term.to_be_bytes());
        out.extend_from_slice(&self.candidate_id.to_be_bytes());
        out.extend_from_slice(&self.last_log_index.to_be_bytes());
        out.extend_from_slice(&self.last_log_term.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, Self::ENCODED_LEN)?;
        Ok(RequestVoteRequest {
            term: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            candidate_id: u16::from_be_bytes(buf[8..10].try_into().unwrap()),
            last_log_index: u64::from_be_bytes(buf[10..18].try_into().unwrap()),
            last_log_term: u64::from_be_bytes(buf[18..26].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

impl RequestVoteResponse {
    pub const ENCODED_LEN: usize = 9;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.term.to_be_bytes());
        out.push(self.vote_granted as u8);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, Self::ENCODED_LEN)?;
        Ok(RequestVoteResponse {
            term: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            vote_granted: buf[8] != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub leader_commit: LogIndex,
    pub entries: Vec<LogEntry>,
}

impl AppendEntriesRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36 + self.entries.len() * 32);
        out.extend_from_slice(&self.term.to_be_bytes());
        out.extend_from_slice(&self.leader_id.to_be_bytes());
        out.extend_from_slice(&self.prev_log_index.to_be_bytes());
        out.extend_from_slice(&self.prev_log_term.to_be_bytes());
        out.extend_from_slice(&self.leader_commit.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            encode_entry(&mut out, entry);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, 8 + 2 + 8 + 8 + 8 + 4)?;
        let term = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let leader_id = u16::from_be_bytes(buf[8..10].try_into().unwrap());
        let prev_log_index = u64::from_be_bytes(buf[10..18].try_into().unwrap());
        let prev_log_term = u64::from_be_bytes(buf[18..26].try_into().unwrap());
        let leader_commit = u64::from_be_bytes(buf[26..34].try_into().unwrap());
        let entry_count = u32::from_be_bytes(buf[34..38].try_into().unwrap());
        if entry_count > MAX_ENTRIES_PER_APPEND {
            return Err(WireError::TooManyEntries(entry_count));
        }

        let mut pos = 38;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let (entry, consumed) = decode_entry(&buf[pos..])?;
            pos += consumed;
            entries.push(entry);
        }

        Ok(AppendEntriesRequest {
            term,
            leader_id,
            prev_log_index,
            prev_log_term,
            leader_commit,
            entries,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    pub match_index: LogIndex,
}

impl AppendEntriesResponse {
    pub const ENCODED_LEN: usize = 17;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.term.to_be_bytes());
        out.push(self.success as u8);
        out.extend_from_slice(&self.match_index.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, Self::ENCODED_LEN)?;
        Ok(AppendEntriesResponse {
            term: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            success: buf[8] != 0,
            match_index: u64::from_be_bytes(buf[9..17].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub offset: u64,
    pub data: Vec<u8>,
    pub done: bool,
}

impl InstallSnapshotRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(39 + self.data.len());
        out.extend_from_slice(&self.term.to_be_bytes());
        out.extend_from_slice(&self.leader_id.to_be_bytes());
        out.extend_from_slice(&self.last_included_index.to_be_bytes());
        out.extend_from_slice(&self.last_included_term.to_be_bytes());
        out.extend_from_slice(&self.offset.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out.push(self.done as u8);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, 8 + 2 + 8 + 8 + 8 + 4)?;
        let term = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let leader_id = u16::from_be_bytes(buf[8..10].try_into().unwrap());
        let last_included_index = u64::from_be_bytes(buf[10..18].try_into().unwrap());
        let last_included_term = u64::from_be_bytes(buf[18..26].try_into().unwrap());
        let offset = u64::from_be_bytes(buf[26..34].try_into().unwrap());
        let data_len = u32::from_be_bytes(buf[34..38].try_into().unwrap()) as usize;
        need(buf, 38 + data_len + 1)?;
        let data = buf[38..38 + data_len].to_vec();
        let done = buf[38 + data_len] != 0;

        Ok(InstallSnapshotRequest {
            term,
            leader_id,
            last_included_index,
            last_included_term,
            offset,
            data,
            done,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallSnapshotResponse {
    pub term: Term,
}

impl InstallSnapshotResponse {
    pub const ENCODED_LEN: usize = 8;

    pub fn encode(&self) -> Vec<u8> {
        self.term.to_be_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        need(buf, Self::ENCODED_LEN)?;
        Ok(InstallSnapshotResponse {
            term: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_vote_request_is_26_bytes() {
        let req = RequestVoteRequest {
            term: 7,
            candidate_id: 9,
            last_log_index: 5,
            last_log_term: 3,
        };
        let encoded = req.encode();
        assert_eq!(encoded.len(), 26);
        assert_eq!(RequestVoteRequest::decode(&encoded).unwrap(), req);
    }

    #[test]
    fn append_entries_round_trips_with_entries() {
        let req = AppendEntriesRequest {
            term: 1,
            leader_id: 2,
            prev_log_index: 0,
            prev_log_term: 0,
            leader_commit: 0,
            entries: vec![LogEntry {
                term: 1,
                index: 1,
                entry_type: EntryType::Command,
                data: b"set k v".to_vec(),
                timestamp_ms: 123,
                client_id: 5,
            }],
        };
        let encoded = req.encode();
        assert_eq!(AppendEntriesRequest::decode(&encoded).unwrap(), req);
    }

    #[test]
    fn append_entries_rejects_too_many_entries() {
        let mut buf = vec![0u8; 38];
        buf[34..38].copy_from_slice(&(MAX_ENTRIES_PER_APPEND + 1).to_be_bytes());
        let err = AppendEntriesRequest::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::TooManyEntries(MAX_ENTRIES_PER_APPEND + 1));
    }

    #[test]
    fn responses_have_pinned_sizes() {
        assert_eq!(
            RequestVoteResponse { term: 1, vote_granted: true }.encode().len(),
            9
        );
        assert_eq!(
            AppendEntriesResponse { term: 1, success: true, match_index: 4 }
                .encode()
                .len(),
            17
        );
        assert_eq!(InstallSnapshotResponse { term: 1 }.encode().len(), 8);
    }

    #[test]
    fn truncated_payload_is_rejected_not_panicked() {
        assert!(RequestVoteRequest::decode(&[1, 2, 3]).is_err());
        assert!(AppendEntriesResponse::decode(&[]).is_err());
    }
}
