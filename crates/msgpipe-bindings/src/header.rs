use bytes::BufMut;

use crate::error::{BindingsError, Result};

/// Header without a request id: num_bytes (4) + num_fields (4) + type (4) + flags (4).
pub const SIMPLE_MESSAGE_SIZE: u32 = 16;
pub const SIMPLE_MESSAGE_NUM_FIELDS: u32 = 2;

/// Header with a trailing 8-byte request id.
pub const MESSAGE_WITH_REQUEST_ID_SIZE: u32 = 24;
pub const MESSAGE_WITH_REQUEST_ID_NUM_FIELDS: u32 = 3;

/// The sender waits for a reply carrying the same request id.
pub const MESSAGE_EXPECTS_RESPONSE_FLAG: u32 = 1 << 0;
/// This message answers an earlier request.
pub const MESSAGE_IS_RESPONSE_FLAG: u32 = 1 << 1;

/// Header at the front of every routed message.
///
/// Wire format (little-endian):
/// ```text
/// ┌───────────┬────────────┬──────────┬──────────┬─────────────────────┐
/// │ num_bytes │ num_fields │ type     │ flags    │ request_id          │
/// │ (4B)      │ (4B)       │ (4B)     │ (4B)     │ (8B, 3 fields only) │
/// └───────────┴────────────┴──────────┴──────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: u32,
    pub flags: u32,
    pub request_id: Option<u64>,
}

impl MessageHeader {
    /// A header for a one-way message.
    pub fn simple(message_type: u32) -> Self {
        Self {
            message_type,
            flags: 0,
            request_id: None,
        }
    }

    /// A header for a request; the router assigns the actual id.
    pub fn request(message_type: u32) -> Self {
        Self {
            message_type,
            flags: MESSAGE_EXPECTS_RESPONSE_FLAG,
            request_id: Some(0),
        }
    }

    /// A header answering `request_id`.
    pub fn response(message_type: u32, request_id: u64) -> Self {
        Self {
            message_type,
            flags: MESSAGE_IS_RESPONSE_FLAG,
            request_id: Some(request_id),
        }
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    pub fn expects_response(&self) -> bool {
        self.has_flag(MESSAGE_EXPECTS_RESPONSE_FLAG)
    }

    pub fn is_response(&self) -> bool {
        self.has_flag(MESSAGE_IS_RESPONSE_FLAG)
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self.request_id {
            Some(_) => MESSAGE_WITH_REQUEST_ID_SIZE as usize,
            None => SIMPLE_MESSAGE_SIZE as usize,
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        match self.request_id {
            Some(request_id) => {
                dst.put_u32_le(MESSAGE_WITH_REQUEST_ID_SIZE);
                dst.put_u32_le(MESSAGE_WITH_REQUEST_ID_NUM_FIELDS);
                dst.put_u32_le(self.message_type);
                dst.put_u32_le(self.flags);
                dst.put_u64_le(request_id);
            }
            None => {
                dst.put_u32_le(SIMPLE_MESSAGE_SIZE);
                dst.put_u32_le(SIMPLE_MESSAGE_NUM_FIELDS);
                dst.put_u32_le(self.message_type);
                dst.put_u32_le(self.flags);
            }
        }
    }

    /// Decode and validate the header at the start of `buf`.
    ///
    /// Returns the header and the declared header length, which may exceed
    /// the fields understood here when a newer sender appended more.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 8 {
            return Err(invalid("buffer shorter than header prefix"));
        }
        let num_bytes = read_u32(buf, 0);
        let num_fields = read_u32(buf, 4);

        let well_formed = match num_fields {
            0 | 1 => false,
            SIMPLE_MESSAGE_NUM_FIELDS => num_bytes == SIMPLE_MESSAGE_SIZE,
            MESSAGE_WITH_REQUEST_ID_NUM_FIELDS => num_bytes == MESSAGE_WITH_REQUEST_ID_SIZE,
            _ => num_bytes >= MESSAGE_WITH_REQUEST_ID_SIZE,
        };
        if !well_formed {
            return Err(invalid(format!(
                "unexpected size {num_bytes} for {num_fields} fields"
            )));
        }

        let declared = num_bytes as usize;
        if buf.len() < declared {
            return Err(invalid(format!(
                "header declares {declared} bytes, buffer holds {}",
                buf.len()
            )));
        }

        let message_type = read_u32(buf, 8);
        let flags = read_u32(buf, 12);
        let request_id = if num_fields >= MESSAGE_WITH_REQUEST_ID_NUM_FIELDS {
            Some(read_u64(buf, 16))
        } else {
            None
        };

        let header = Self {
            message_type,
            flags,
            request_id,
        };
        if header.expects_response() && header.is_response() {
            return Err(invalid("message is both a request and a response"));
        }
        if header.request_id.is_none() && (header.expects_response() || header.is_response()) {
            return Err(invalid("request/response flags without a request id"));
        }
        Ok((header, declared))
    }
}

fn invalid(reason: impl Into<String>) -> BindingsError {
    BindingsError::InvalidHeader(reason.into())
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
