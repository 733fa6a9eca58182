//! Shared big-endian primitives for the gossip and RPC wire formats (§6).
//! Raft's own wire types live in the `raft` crate and do not use this
//! module; this one backs `gossip::message` and `rpc::frame`.

use std::convert::TryInto;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload truncated: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
}

pub fn need(buf: &[u8], n: usize) -> Result<(), CodecError> {
    if buf.len() < n {
        Err(CodecError::Truncated { need: n, have: buf.len() })
    } else {
        Ok(())
    }
}

pub fn put_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn get_u8(buf: &[u8], pos: usize) -> u8 {
    buf[pos]
}

pub fn get_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap())
}

pub fn get_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap())
}

pub fn get_u64(buf: &[u8], pos: usize) -> u64 {
    u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap())
}

/// Writes an ASCII string into a fixed-width, null-padded field (the
/// `ip_ascii(16)` / `*_addr(64)` fields in §6). Truncates silently if the
/// string is longer than `width` — callers only ever pass addresses that
/// fit.
pub fn put_fixed_ascii(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

pub fn get_fixed_ascii(buf: &[u8], pos: usize, width: usize) -> String {
    let field = &buf[pos..pos + width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ascii_round_trips() {
        let mut out = Vec::new();
        put_fixed_ascii(&mut out, "127.0.0.1", 16);
        assert_eq!(out.len(), 16);
        assert_eq!(get_fixed_ascii(&out, 0, 16), "127.0.0.1");
    }

    #[test]
    fn need_rejects_short_buffers() {
        assert!(need(&[1, 2], 3).is_err());
        assert!(need(&[1, 2, 3], 3).is_ok());
    }
}
