//! Bindings between message pipes and in-process message consumers.
//!
//! A [`Connector`] owns one pipe endpoint. Once started on a
//! [`RunLoop`](msgpipe_system::RunLoop) it delivers inbound messages to a
//! [`MessageReceiver`] and reports terminal channel faults to a
//! [`ConnectionErrorHandler`]. A [`Router`] layers request/response matching
//! on top, keyed by the request id in each [`MessageHeader`].

pub mod capture;
pub mod connector;
pub mod error;
pub mod header;
pub mod message;
pub mod receiver;
pub mod router;

pub use capture::{CapturingErrorHandler, RecordingMessageReceiver};
pub use connector::{Connector, ConnectorSender, ConnectorState};
pub use error::{BindingsError, ConnectionError, Result};
pub use header::{
    MessageHeader, MESSAGE_EXPECTS_RESPONSE_FLAG, MESSAGE_IS_RESPONSE_FLAG,
    MESSAGE_WITH_REQUEST_ID_NUM_FIELDS, MESSAGE_WITH_REQUEST_ID_SIZE, SIMPLE_MESSAGE_NUM_FIELDS,
    SIMPLE_MESSAGE_SIZE,
};
pub use message::{Message, MessageWithHeader};
pub use receiver::{ConnectionErrorHandler, MessageReceiver, MessageReceiverWithResponder};
pub use router::Router;
