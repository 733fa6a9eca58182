//! The RPC wire frame (§4.7 / §6): a 12-byte header followed by payload.
//!
//! ```text
//! 0  4  total frame length (big-endian), must be >= 12
//! 4  4  request id
//! 8  2  sender node id
//! 10 1  high nibble = type (status=0, request=1, response=2), low nibble = status
//! 11 1  function id
//! ```

use crate::codec::{get_u16, get_u32, get_u8, put_u16, put_u32, put_u8, CodecError};
use crate::rpc::status::Status;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Status = 0,
    Request = 1,
    Response = 2,
}

impl FrameType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(FrameType::Status),
            1 => Some(FrameType::Request),
            2 => Some(FrameType::Response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_id: u32,
    pub sender_id: u16,
    pub frame_type: FrameType,
    pub status: Status,
    pub function_id: u8,
    pub payload: Vec<u8>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("declared frame length {0} is below the 12-byte header minimum")]
    TooShort(u32),
    #[error("unknown frame type nibble {0}")]
    UnknownType(u8),
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let total_len = (HEADER_LEN + self.payload.len()) as u32;
        let mut out = Vec::with_capacity(total_len as usize);
        put_u32(&mut out, total_len);
        put_u32(&mut out, self.request_id);
        put_u16(&mut out, self.sender_id);
        let type_status = ((self.frame_type as u8) << 4) | (self.status.to_u8() & 0x0F);
        put_u8(&mut out, type_status);
        put_u8(&mut out, self.function_id);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes one frame from the front of `buf`, returning the frame and
    /// the number of bytes consumed. Returns `Ok(None)` if `buf` doesn't
    /// yet contain a full frame (the caller should wait for more bytes).
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let total_len = get_u32(buf, 0);
        if (total_len as usize) < HEADER_LEN {
            return Err(FrameError::TooShort(total_len));
        }
        if buf.len() < total_len as usize {
            return Ok(None);
        }

        let request_id = get_u32(buf, 4);
        let sender_id = get_u16(buf, 8);
        let type_status = get_u8(buf, 10);
        let frame_type = FrameType::from_nibble(type_status >> 4).ok_or(FrameError::UnknownType(type_status >> 4))?;
        let status = Status::from_u8(type_status & 0x0F);
        let function_id = get_u8(buf, 11);
        let payload = buf[HEADER_LEN..total_len as usize].to_vec();

        Ok(Some((
            Frame { request_id, sender_id, frame_type, status, function_id, payload },
            total_len as usize,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_twelve_bytes_for_empty_payload() {
        let frame = Frame {
            request_id: 1,
            sender_id: 2,
            frame_type: FrameType::Request,
            status: Status::Success,
            function_id: 0x40,
            payload: vec![],
        };
        assert_eq!(frame.encode().len(), HEADER_LEN);
    }

    #[test]
    fn round_trips_with_payload() {
        let frame = Frame {
            request_id: 42,
            sender_id: 7,
            frame_type: FrameType::Response,
            status: Status::Timeout,
            function_id: 0x01,
            payload: b"payload".to_vec(),
        };
        let encoded = frame.encode();
        let (decoded, consumed) = Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn waits_for_more_bytes_on_partial_frame() {
        let frame = Frame {
            request_id: 1,
            sender_id: 1,
            frame_type: FrameType::Request,
            status: Status::Success,
            function_id: 1,
            payload: b"hello".to_vec(),
        };
        let encoded = frame.encode();
        assert!(Frame::decode(&encoded[..HEADER_LEN]).unwrap().is_none());
    }

    #[test]
    fn rejects_declared_length_below_header_minimum() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&11u32.to_be_bytes());
        assert!(matches!(Frame::decode(&buf), Err(FrameError::TooShort(11))));
    }
}
