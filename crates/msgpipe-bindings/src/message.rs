use bytes::{Bytes, BytesMut};
use msgpipe_system::{Handle, RawMessage};

use crate::error::{BindingsError, Result};
use crate::header::MessageHeader;

/// An opaque byte buffer plus the handles transferred with it.
///
/// Immutable once built. Sending a message moves it, and the handles with it.
#[derive(Debug)]
pub struct Message {
    buffer: Bytes,
    handles: Vec<Handle>,
}

impl Message {
    pub fn new(buffer: impl Into<Bytes>, handles: Vec<Handle>) -> Self {
        Self {
            buffer: buffer.into(),
            handles,
        }
    }

    /// A message with no handles.
    pub fn from_bytes(buffer: impl Into<Bytes>) -> Self {
        Self::new(buffer, Vec::new())
    }

    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_parts(self) -> (Bytes, Vec<Handle>) {
        (self.buffer, self.handles)
    }
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        Self::new(raw.bytes, raw.handles)
    }
}

/// A message whose buffer starts with a validated [`MessageHeader`].
#[derive(Debug)]
pub struct MessageWithHeader {
    message: Message,
    header: MessageHeader,
    header_len: usize,
}

impl MessageWithHeader {
    /// Validate the header at the front of `message`.
    pub fn new(message: Message) -> Result<Self> {
        let (header, header_len) = MessageHeader::decode(message.buffer())?;
        Ok(Self {
            message,
            header,
            header_len,
        })
    }

    /// Build a message from a header and a payload.
    pub fn build(header: MessageHeader, payload: &[u8], handles: Vec<Handle>) -> Self {
        let mut buffer = BytesMut::with_capacity(header.size() + payload.len());
        header.encode(&mut buffer);
        buffer.extend_from_slice(payload);
        Self {
            header_len: header.size(),
            header,
            message: Message::new(buffer.freeze(), handles),
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The bytes following the header.
    pub fn payload(&self) -> Bytes {
        self.message.buffer().slice(self.header_len..)
    }

    /// Rewrite the request id. Only request/response headers carry one.
    pub fn set_request_id(&mut self, request_id: u64) -> Result<()> {
        if self.header.request_id.is_none() {
            return Err(BindingsError::InvalidHeader(
                "message has no request id field".to_string(),
            ));
        }
        let mut buffer = BytesMut::from(self.message.buffer().as_ref());
        buffer[16..24].copy_from_slice(&request_id.to_le_bytes());
        let handles = std::mem::take(&mut self.message.handles);
        self.message = Message::new(buffer.freeze(), handles);
        self.header.request_id = Some(request_id);
        Ok(())
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{MESSAGE_IS_RESPONSE_FLAG, SIMPLE_MESSAGE_SIZE};

    #[test]
    fn build_and_parse_back() {
        let built = MessageWithHeader::build(MessageHeader::simple(4), b"body", Vec::new());
        assert_eq!(built.message().len(), SIMPLE_MESSAGE_SIZE as usize + 4);

        let parsed = MessageWithHeader::new(built.into_message()).unwrap();
        assert_eq!(parsed.header().message_type, 4);
        assert_eq!(parsed.payload().as_ref(), b"body");
    }

    #[test]
    fn set_request_id_rewrites_buffer() {
        let mut request = MessageWithHeader::build(MessageHeader::request(2), b"q", Vec::new());
        request.set_request_id(42).unwrap();
        assert_eq!(request.header().request_id, Some(42));

        let reparsed = MessageWithHeader::new(request.into_message()).unwrap();
        assert_eq!(reparsed.header().request_id, Some(42));
        assert_eq!(reparsed.payload().as_ref(), b"q");
    }

    #[test]
    fn set_request_id_requires_id_field() {
        let mut simple = MessageWithHeader::build(MessageHeader::simple(2), b"", Vec::new());
        assert!(simple.set_request_id(1).is_err());
    }

    #[test]
    fn invalid_buffer_is_rejected() {
        let err = MessageWithHeader::new(Message::from_bytes(&b"nope"[..])).unwrap_err();
        assert!(matches!(err, BindingsError::InvalidHeader(_)));
    }

    #[test]
    fn response_flag_survives_round_trip() {
        let response = MessageWithHeader::build(MessageHeader::response(8, 11), b"a", Vec::new());
        let parsed = MessageWithHeader::new(response.into_message()).unwrap();
        assert!(parsed.header().has_flag(MESSAGE_IS_RESPONSE_FLAG));
        assert_eq!(parsed.header().request_id, Some(11));
    }
}
