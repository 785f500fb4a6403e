use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::FrameKind;

/// magic (2) + length (4) + kind (2).
pub const HEADER_SIZE: usize = 8;

/// "MP".
pub const MAGIC: [u8; 2] = [0x4D, 0x50];

/// 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Message,
            payload: payload.into(),
        }
    }

    pub fn close() -> Self {
        Self {
            kind: FrameKind::Close,
            payload: Bytes::new(),
        }
    }

    /// Header plus payload.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one frame to `dst`.
///
/// ```text
/// ┌────────────┬──────────┬──────────┬──────────────────┐
/// │ Magic (2B) │ Length   │ Kind     │ Payload          │
/// │ "MP"       │ (4B LE)  │ (2B LE)  │ (Length bytes)   │
/// └────────────┴──────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(kind: FrameKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind.as_u16());
    dst.put_slice(payload);
    Ok(())
}

/// Take one frame off the front of `src`.
///
/// Returns `Ok(None)` until a complete frame is buffered. Nothing is consumed
/// unless a frame is returned.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let kind = FrameKind::from_u16(header.get_u16_le())?;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { kind, payload }))
}

/// Limits and timeouts for frame I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub max_payload_size: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_layout() {
        let mut buf = BytesMut::new();
        encode_frame(FrameKind::Message, b"hello, pipe", &mut buf).unwrap();

        assert_eq!(&buf[0..2], b"MP");
        assert_eq!(&buf[2..6], &11u32.to_le_bytes());
        assert_eq!(&buf[6..8], &0u16.to_le_bytes());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::message(&b"hello, pipe"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn close_frame_is_header_only() {
        let mut buf = BytesMut::new();
        encode_frame(FrameKind::Close, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::close());
    }

    #[test]
    fn incomplete_input_consumes_nothing() {
        let mut buf = BytesMut::new();
        encode_frame(FrameKind::Message, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        let before = buf.len();

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), before);

        let mut short = BytesMut::from(&MAGIC[..]);
        assert!(decode_frame(&mut short, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::InvalidMagic)
        ));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(0);
        buf.put_u16_le(9);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::UnknownKind(9))
        ));
    }

    #[test]
    fn oversized_length_rejected_before_payload_arrives() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(32 * 1024 * 1024);
        buf.put_u16_le(0);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_frame(FrameKind::Message, b"first", &mut buf).unwrap();
        encode_frame(FrameKind::Close, b"", &mut buf).unwrap();

        let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let second = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.kind, FrameKind::Close);
        assert!(buf.is_empty());
    }

    #[test]
    fn wire_size_counts_header() {
        assert_eq!(Frame::message(Bytes::from_static(b"test")).wire_size(), HEADER_SIZE + 4);
    }
}
